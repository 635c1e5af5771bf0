//! The filter node: synchronize, reframe, filter and publish.

use crate::{
    config::UpdateBatch,
    diagnostics::{Diagnostics, Notice, StreamKind, TracingDiagnostics},
    filter::FilterAlgorithm,
    pipeline::ReframingPipeline,
    publisher::{Publisher, Sink},
    resolver::FrameResolver,
    settings::NodeConfig,
    store::ConfigStore,
    sync::{Rejection, StreamSynchronizer, SyncStats},
    types::{IndexSubset, Record, SynchronizedPair},
};
use eyre::Result;
use futures::{Stream, StreamExt};
use std::{
    pin::pin,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// A message from either input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Record(Record),
    Indices(IndexSubset),
}

impl From<Record> for Input {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<IndexSubset> for Input {
    fn from(indices: IndexSubset) -> Self {
        Self::Indices(indices)
    }
}

/// Counters of a running [FilterNode].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub sync: SyncStats,

    /// Records accepted by the sink.
    pub published: u64,

    /// Pairs that failed in the pipeline.
    pub aborted: u64,

    /// Records the sink refused.
    pub publish_failed: u64,
}

/// Owns one synchronizer, one pipeline and one publisher, and shares its
/// [ConfigStore] with the configuration path.
///
/// Pairs are processed one at a time in the order the synchronizer emits
/// them. Each pair reads one snapshot of the store, so a configuration
/// update takes effect from the next pair on.
pub struct FilterNode<F, R, S> {
    synchronizer: StreamSynchronizer,
    pipeline: ReframingPipeline<F, R>,
    publisher: Publisher<S>,
    store: Arc<ConfigStore>,
    diagnostics: Box<dyn Diagnostics>,
    aborted: u64,
    publish_failed: u64,
}

impl<F, R, S> FilterNode<F, R, S>
where
    F: FilterAlgorithm,
    R: FrameResolver,
    S: Sink,
{
    pub fn new(config: &NodeConfig, filter: F, resolver: R, sink: S) -> Result<Self> {
        config.validate()?;

        let policy = config.match_policy()?;
        let synchronizer = StreamSynchronizer::new(policy, config.sync.max_queue_size)?;
        let store = ConfigStore::new(config.initial_configuration());

        info!(
            policy = ?policy,
            max_queue_size = config.sync.max_queue_size,
            input_frame = %config.frames.input_frame,
            output_frame = %config.frames.output_frame,
            "Creating filter node"
        );

        Ok(Self {
            synchronizer,
            pipeline: ReframingPipeline::new(filter, resolver),
            publisher: Publisher::new(sink),
            store: Arc::new(store),
            diagnostics: Box::new(TracingDiagnostics),
            aborted: 0,
            publish_failed: 0,
        })
    }

    /// Replace the default `tracing` diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    /// The store shared with the configuration path.
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &ReframingPipeline<F, R> {
        &self.pipeline
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    /// Handle a record from the primary stream, then process and publish
    /// every pair that became available.
    pub fn on_record(&mut self, record: Record) -> Result<(), Rejection> {
        let stamp = record.stamp();
        debug!(
            stamp = ?stamp,
            frame_id = %record.header.frame_id,
            num_points = record.len(),
            "Received record"
        );

        let result = self.synchronizer.push_record(record);
        self.finish_push(StreamKind::Records, stamp, result)
    }

    /// Handle an index subset from the auxiliary stream, then process and
    /// publish every pair that became available.
    pub fn on_indices(&mut self, indices: IndexSubset) -> Result<(), Rejection> {
        let stamp = indices.stamp();
        debug!(
            stamp = ?stamp,
            num_indices = indices.indices.len(),
            "Received indices"
        );

        let result = self.synchronizer.push_indices(indices);
        self.finish_push(StreamKind::Indices, stamp, result)
    }

    /// Dispatch one input to [on_record](Self::on_record) or
    /// [on_indices](Self::on_indices).
    pub fn on_input(&mut self, input: Input) -> Result<(), Rejection> {
        match input {
            Input::Record(record) => self.on_record(record),
            Input::Indices(indices) => self.on_indices(indices),
        }
    }

    /// Process inputs until the stream ends, applying configuration
    /// batches from `updates` as they arrive.
    ///
    /// A batch that is ready is always applied before the next input, so
    /// it takes effect from the next pair on. Batches still queued when the
    /// inputs end are applied before returning. Returns the final
    /// statistics.
    pub async fn run<I>(
        mut self,
        inputs: I,
        updates: flume::Receiver<UpdateBatch>,
    ) -> Result<NodeStats>
    where
        I: Stream<Item = Input>,
    {
        info!("Starting filter node");

        let mut inputs = pin!(inputs);
        let mut updates_open = true;
        let mut last_stats_log = Instant::now();
        let stats_log_interval = Duration::from_secs(10);

        loop {
            tokio::select! {
                biased;

                batch = updates.recv_async(), if updates_open => match batch {
                    Ok(batch) => {
                        self.store.apply_updates(&batch);
                    }
                    Err(_) => {
                        debug!("Configuration channel closed");
                        updates_open = false;
                    }
                },

                input = inputs.next() => {
                    let Some(input) = input else {
                        break;
                    };

                    // Rejections are already reported to the diagnostics sink.
                    let _ = self.on_input(input);

                    if last_stats_log.elapsed() >= stats_log_interval {
                        self.log_stats();
                        last_stats_log = Instant::now();
                    }
                }
            }
        }

        for batch in updates.try_iter() {
            self.store.apply_updates(&batch);
        }

        info!("Filter node input ended");
        self.log_stats();

        Ok(self.stats())
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            sync: self.synchronizer.stats(),
            published: self.publisher.published(),
            aborted: self.aborted,
            publish_failed: self.publish_failed,
        }
    }

    fn finish_push(
        &mut self,
        stream: StreamKind,
        stamp: Duration,
        result: Result<(), Rejection>,
    ) -> Result<(), Rejection> {
        if let Err(rejection) = &result {
            self.diagnostics.notice(Notice::Rejected {
                stream,
                stamp,
                reason: rejection.to_string(),
            });
        }

        while let Some(pair) = self.synchronizer.try_match() {
            self.handle_pair(pair);
        }

        for notice in self.synchronizer.take_notices() {
            self.diagnostics.notice(notice);
        }

        result
    }

    fn handle_pair(&mut self, pair: SynchronizedPair) {
        let config = self.store.snapshot();
        let stamp = pair.stamp();
        let frame_id = pair.record.header.frame_id.clone();

        let record = match self.pipeline.process(pair, &config) {
            Ok(record) => record,
            Err(abort) => {
                self.aborted += 1;
                self.diagnostics.notice(Notice::Aborted {
                    stamp,
                    frame_id,
                    stage: abort.stage(),
                    reason: abort.to_string(),
                });
                return;
            }
        };

        if let Err(err) = self.publisher.publish(record) {
            self.publish_failed += 1;
            warn!(stamp = ?stamp, error = %format!("{err:#}"), "Failed to publish record");
        }
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            pairs_emitted = stats.sync.pairs_emitted,
            rejected = stats.sync.rejected,
            evicted = stats.sync.evicted,
            commit_ts = ?stats.sync.commit_ts,
            buffered_records = stats.sync.buffered_records,
            buffered_indices = stats.sync.buffered_indices,
            published = stats.published,
            aborted = stats.aborted,
            publish_failed = stats.publish_failed,
            "Filter node statistics"
        );
    }
}
