//! Per-pair processing: input reframing, filtering, output reframing.

use crate::{
    config::Configuration,
    diagnostics::Stage,
    filter::FilterAlgorithm,
    resolver::{FrameResolver, transform_record},
    types::{Record, SynchronizedPair},
};
use std::borrow::Cow;
use tracing::debug;

/// Why a synchronized pair produced no output.
#[derive(Debug, thiserror::Error)]
pub enum Abort {
    #[error("error converting input dataset from '{from}' to '{to}': {reason:#}")]
    InputTransform {
        from: String,
        to: String,
        reason: eyre::Report,
    },
    #[error("filter failed: {reason:#}")]
    Filter { reason: eyre::Report },
    #[error("error converting output dataset from '{from}' to '{to}': {reason:#}")]
    OutputTransform {
        from: String,
        to: String,
        reason: eyre::Report,
    },
}

impl Abort {
    pub fn stage(&self) -> Stage {
        match self {
            Self::InputTransform { .. } => Stage::InputTransform,
            Self::Filter { .. } => Stage::Filter,
            Self::OutputTransform { .. } => Stage::OutputTransform,
        }
    }
}

/// Reframes, filters and reframes back one synchronized pair at a time.
///
/// The filter and the resolver are injected. The pipeline keeps no state
/// between calls, so [process](ReframingPipeline::process) only depends on
/// its arguments and on the collaborators.
#[derive(Debug)]
pub struct ReframingPipeline<F, R> {
    filter: F,
    resolver: R,
}

impl<F, R> ReframingPipeline<F, R>
where
    F: FilterAlgorithm,
    R: FrameResolver,
{
    pub fn new(filter: F, resolver: R) -> Self {
        Self { filter, resolver }
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Run one pair through the pipeline under a fixed configuration.
    ///
    /// On success the output is expressed in `config.output_frame`, or in
    /// the input record's own frame when that is empty, and carries the
    /// input record's timestamp.
    pub fn process(&self, pair: SynchronizedPair, config: &Configuration) -> Result<Record, Abort> {
        let SynchronizedPair { record, indices } = pair;
        let original_stamp = record.header.stamp;
        let original_frame = record.header.frame_id.clone();

        let input = if !config.input_frame.is_empty() && original_frame != config.input_frame {
            debug!(
                from = %original_frame,
                to = %config.input_frame,
                "Transforming input dataset"
            );
            let reframed = transform_record(&record, &config.input_frame, &self.resolver)
                .map_err(|reason| Abort::InputTransform {
                    from: original_frame.clone(),
                    to: config.input_frame.clone(),
                    reason,
                })?;
            Cow::Owned(reframed)
        } else {
            Cow::Borrowed(&record)
        };

        let filtered = self
            .filter
            .filter(&input, indices.as_ref(), config)
            .map_err(|reason| Abort::Filter { reason })?;

        let output_frame = if config.output_frame.is_empty() {
            &original_frame
        } else {
            &config.output_frame
        };

        let mut output = if filtered.header.frame_id != *output_frame {
            debug!(
                from = %filtered.header.frame_id,
                to = %output_frame,
                "Transforming output dataset"
            );
            transform_record(&filtered, output_frame, &self.resolver).map_err(|reason| {
                Abort::OutputTransform {
                    from: filtered.header.frame_id.clone(),
                    to: output_frame.clone(),
                    reason,
                }
            })?
        } else {
            filtered
        };

        output.header.stamp = original_stamp;
        Ok(output)
    }
}
