use crate::{
    config::Configuration,
    types::{IndexSubset, Record},
};
use eyre::Result;

/// The content filter applied to every synchronized record.
///
/// Implementations must be pure: the same record, indices and
/// configuration always produce the same output, and the inputs are
/// left untouched. The output keeps the frame of the input record.
pub trait FilterAlgorithm: Send + Sync {
    fn filter(
        &self,
        record: &Record,
        indices: Option<&IndexSubset>,
        config: &Configuration,
    ) -> Result<Record>;
}

impl<F> FilterAlgorithm for F
where
    F: Fn(&Record, Option<&IndexSubset>, &Configuration) -> Result<Record> + Send + Sync,
{
    fn filter(
        &self,
        record: &Record,
        indices: Option<&IndexSubset>,
        config: &Configuration,
    ) -> Result<Record> {
        self(record, indices, config)
    }
}

/// Returns the record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl FilterAlgorithm for Identity {
    fn filter(
        &self,
        record: &Record,
        _indices: Option<&IndexSubset>,
        _config: &Configuration,
    ) -> Result<Record> {
        Ok(record.clone())
    }
}
