use crate::{
    buffer::Buffer,
    diagnostics::{EvictReason, Notice, StreamKind},
    types::{IndexSubset, Record, SynchronizedPair},
};
use eyre::{Result, ensure};
use itertools::Itertools;
use std::{cmp::Ordering, time::Duration};
use tracing::debug;

/// How records are paired with index subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// The index stream is not in use. Every record is emitted
    /// immediately on its own.
    Passthrough,
    /// A record pairs with the index subset carrying the identical
    /// timestamp.
    Exact,
    /// A record pairs with the closest index subset no further than
    /// `tolerance` away.
    Approximate { tolerance: Duration },
}

/// Why an input was refused by [StreamSynchronizer].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("input at {stamp:?} arrived after {latest:?}")]
    Late { stamp: Duration, latest: Duration },
    #[error("the index stream is not in use")]
    Disabled,
}

/// Statistics about the synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Number of pairs emitted.
    pub pairs_emitted: u64,

    /// Number of inputs refused on arrival.
    pub rejected: u64,

    /// Number of buffered inputs dropped without being paired.
    pub evicted: u64,

    /// Timestamp of the last emitted pair.
    pub commit_ts: Option<Duration>,

    /// Number of records waiting for a match.
    pub buffered_records: usize,

    /// Number of index subsets waiting for a match.
    pub buffered_indices: usize,
}

/// Pairs the record stream with the optional index stream by timestamp.
///
/// Both streams are buffered separately, each holding at most
/// `max_queue_size` messages. A full buffer drops its oldest message;
/// pushing never blocks. Pairs come out of
/// [try_match](StreamSynchronizer::try_match) in strictly increasing
/// record timestamp order, and messages that can no longer be emitted in
/// that order are evicted and reported as [Notice]s.
#[derive(Debug)]
pub struct StreamSynchronizer {
    policy: MatchPolicy,
    records: Buffer<Record>,
    indices: Buffer<IndexSubset>,

    /// Timestamp of the last emitted pair.
    commit_ts: Option<Duration>,

    notices: Vec<Notice>,
    pairs_emitted: u64,
    rejected: u64,
    evicted: u64,
}

impl StreamSynchronizer {
    pub fn new(policy: MatchPolicy, max_queue_size: usize) -> Result<Self> {
        ensure!(max_queue_size >= 1, "max_queue_size must be at least 1");
        if let MatchPolicy::Approximate { tolerance } = policy {
            ensure!(
                !tolerance.is_zero(),
                "approximate matching needs a non-zero tolerance"
            );
        }

        Ok(Self {
            policy,
            records: Buffer::with_capacity(max_queue_size),
            indices: Buffer::with_capacity(max_queue_size),
            commit_ts: None,
            notices: vec![],
            pairs_emitted: 0,
            rejected: 0,
            evicted: 0,
        })
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn commit_timestamp(&self) -> Option<Duration> {
        self.commit_ts
    }

    /// Accept a record from the primary stream.
    pub fn push_record(&mut self, record: Record) -> Result<(), Rejection> {
        if let Err(reason) = record.validate() {
            self.rejected += 1;
            return Err(Rejection::Invalid(reason));
        }

        let stamp = record.stamp();
        let dropped = if self.policy == MatchPolicy::Passthrough {
            self.records.push(record)
        } else {
            match self.records.try_push(record) {
                Ok(dropped) => dropped,
                Err(_) => {
                    self.rejected += 1;
                    return Err(Rejection::Late {
                        stamp,
                        latest: self.records.last_ts().unwrap_or_default(),
                    });
                }
            }
        };

        if let Some(dropped) = dropped {
            self.evict(StreamKind::Records, dropped.stamp(), EvictReason::Overflow);
        }

        Ok(())
    }

    /// Accept an index subset from the auxiliary stream.
    pub fn push_indices(&mut self, indices: IndexSubset) -> Result<(), Rejection> {
        let slack = match self.policy {
            MatchPolicy::Passthrough => {
                self.rejected += 1;
                return Err(Rejection::Disabled);
            }
            MatchPolicy::Exact => Duration::ZERO,
            MatchPolicy::Approximate { tolerance } => tolerance,
        };

        if let Err(reason) = indices.validate() {
            self.rejected += 1;
            return Err(Rejection::Invalid(reason));
        }

        // Every future record is newer than the commit timestamp.
        let stamp = indices.stamp();
        if let Some(commit_ts) = self.commit_ts
            && stamp + slack <= commit_ts
        {
            self.rejected += 1;
            return Err(Rejection::Late {
                stamp,
                latest: commit_ts,
            });
        }

        match self.indices.try_push(indices) {
            Ok(Some(dropped)) => {
                self.evict(StreamKind::Indices, dropped.stamp(), EvictReason::Overflow);
            }
            Ok(None) => {}
            Err(_) => {
                self.rejected += 1;
                return Err(Rejection::Late {
                    stamp,
                    latest: self.indices.last_ts().unwrap_or_default(),
                });
            }
        }

        Ok(())
    }

    /// Emit the next synchronized pair, if one can be formed now.
    pub fn try_match(&mut self) -> Option<SynchronizedPair> {
        match self.policy {
            MatchPolicy::Passthrough => {
                let record = self.records.pop_front()?;
                Some(self.emit(record, None))
            }
            MatchPolicy::Exact => self.match_exact(),
            MatchPolicy::Approximate { tolerance } => self.match_approximate(tolerance),
        }
    }

    /// Notices generated since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            pairs_emitted: self.pairs_emitted,
            rejected: self.rejected,
            evicted: self.evicted,
            commit_ts: self.commit_ts,
            buffered_records: self.records.len(),
            buffered_indices: self.indices.len(),
        }
    }

    fn match_exact(&mut self) -> Option<SynchronizedPair> {
        // Both buffers are sorted. Walk them together to the oldest
        // timestamp present in both.
        let (mut ri, mut ii) = (0, 0);
        loop {
            let record_ts = self.records.get(ri)?.stamp();
            let indices_ts = self.indices.get(ii)?.stamp();

            match record_ts.cmp(&indices_ts) {
                Ordering::Less => ri += 1,
                Ordering::Greater => ii += 1,
                Ordering::Equal => break,
            }
        }

        // Anything older than the match would be emitted out of order.
        self.evict_records(ri, EvictReason::Superseded);
        self.evict_indices(ii, EvictReason::Superseded);

        let record = self.records.pop_front()?;
        let indices = self.indices.pop_front()?;
        Some(self.emit(record, Some(indices)))
    }

    fn match_approximate(&mut self, tolerance: Duration) -> Option<SynchronizedPair> {
        loop {
            let record_ts = self.records.front_ts()?;

            // Index subsets too old for the oldest record are too old for
            // every later one as well.
            let stale = self
                .indices
                .drain_before(record_ts.saturating_sub(tolerance));
            for indices in stale {
                self.evict(StreamKind::Indices, indices.stamp(), EvictReason::Unmatched);
            }

            let latest_ts = self.indices.last_ts()?;
            let closest = self
                .indices
                .iter()
                .map(|indices| indices.stamp().abs_diff(record_ts))
                .position_min();

            let candidate = closest.and_then(|position| {
                let diff = self.indices.get(position)?.stamp().abs_diff(record_ts);
                (diff <= tolerance).then_some((position, diff))
            });

            match candidate {
                Some((position, diff)) => {
                    // A newer index subset could still land closer.
                    if !diff.is_zero() && latest_ts < record_ts {
                        return None;
                    }

                    self.evict_indices(position, EvictReason::Superseded);
                    let indices = self.indices.pop_front()?;
                    let record = self.records.pop_front()?;
                    return Some(self.emit(record, Some(indices)));
                }
                None => {
                    if latest_ts > record_ts + tolerance {
                        // The index stream has moved past this record.
                        if let Some(record) = self.records.pop_front() {
                            self.evict(StreamKind::Records, record.stamp(), EvictReason::Unmatched);
                        }
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    fn emit(&mut self, record: Record, indices: Option<IndexSubset>) -> SynchronizedPair {
        let stamp = record.stamp();
        self.commit_ts = Some(stamp);
        self.pairs_emitted += 1;

        debug!(
            pair_num = self.pairs_emitted,
            stamp = ?stamp,
            indices_stamp = ?indices.as_ref().map(|indices| indices.stamp()),
            "Emitting synchronized pair"
        );

        SynchronizedPair::new(record, indices)
    }

    fn evict_records(&mut self, count: usize, reason: EvictReason) {
        for record in self.records.drain_front(count) {
            self.evict(StreamKind::Records, record.stamp(), reason);
        }
    }

    fn evict_indices(&mut self, count: usize, reason: EvictReason) {
        for indices in self.indices.drain_front(count) {
            self.evict(StreamKind::Indices, indices.stamp(), reason);
        }
    }

    fn evict(&mut self, stream: StreamKind, stamp: Duration, reason: EvictReason) {
        self.evicted += 1;
        debug!(
            stream = %stream,
            stamp = ?stamp,
            reason = ?reason,
            "Dropped buffered message"
        );
        self.notices.push(Notice::Evicted {
            stream,
            stamp,
            reason,
        });
    }
}
