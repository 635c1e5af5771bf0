//! Client side of the transform lookup service.

use crate::{transform::Transform, types::Record};
use eyre::{Result, WrapErr, bail, ensure};
use indexmap::{IndexMap, IndexSet};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::debug;

/// Looks up the rigid transform that re-expresses data from
/// `source_frame` in `target_frame` at time `stamp`.
///
/// Implementations may cache or interpolate internally. The returned
/// transform must go from `source_frame` to `target_frame`.
pub trait FrameResolver: Send + Sync {
    fn resolve(&self, source_frame: &str, target_frame: &str, stamp: Duration)
    -> Result<Transform>;
}

impl<R> FrameResolver for Arc<R>
where
    R: FrameResolver + ?Sized,
{
    fn resolve(
        &self,
        source_frame: &str,
        target_frame: &str,
        stamp: Duration,
    ) -> Result<Transform> {
        (**self).resolve(source_frame, target_frame, stamp)
    }
}

impl<R> FrameResolver for &R
where
    R: FrameResolver + ?Sized,
{
    fn resolve(
        &self,
        source_frame: &str,
        target_frame: &str,
        stamp: Duration,
    ) -> Result<Transform> {
        (**self).resolve(source_frame, target_frame, stamp)
    }
}

/// Re-express `record` in `target_frame`, looking the transform up at the
/// record's capture time. The output keeps the input timestamp.
pub fn transform_record<R>(record: &Record, target_frame: &str, resolver: &R) -> Result<Record>
where
    R: FrameResolver + ?Sized,
{
    let source_frame = record.header.frame_id.as_str();
    if source_frame == target_frame {
        return Ok(record.clone());
    }

    let stamp = record.header.stamp;
    let transform = resolver
        .resolve(source_frame, target_frame, stamp)
        .wrap_err_with(|| {
            format!("no transform from '{source_frame}' to '{target_frame}' at {stamp:?}")
        })?;

    ensure!(
        transform.source_frame == source_frame && transform.target_frame == target_frame,
        "resolver answered '{}' -> '{}' for a '{}' -> '{}' request",
        transform.source_frame,
        transform.target_frame,
        source_frame,
        target_frame
    );

    transform.apply(record)
}

/// A resolver over a fixed set of transforms.
///
/// Lookups follow registered transforms in either direction and chain
/// through intermediate frames, so registering `base -> sensor` also
/// answers `sensor -> base`. The stamp is ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticFrameResolver {
    transforms: IndexMap<(String, String), Transform>,
}

impl StaticFrameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.insert(transform);
        self
    }

    /// Register a transform, replacing any earlier one between the same
    /// two frames.
    pub fn insert(&mut self, transform: Transform) {
        let key = (
            transform.source_frame.clone(),
            transform.target_frame.clone(),
        );
        self.transforms.insert(key, transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Transforms leaving `frame`, including inverses of those entering it.
    fn edges_from<'a>(&'a self, frame: &'a str) -> impl Iterator<Item = Transform> + 'a {
        self.transforms
            .values()
            .filter_map(move |tf| {
                if tf.source_frame == frame {
                    Some(tf.clone())
                } else if tf.target_frame == frame {
                    Some(tf.inverse())
                } else {
                    None
                }
            })
    }
}

impl FrameResolver for StaticFrameResolver {
    fn resolve(
        &self,
        source_frame: &str,
        target_frame: &str,
        stamp: Duration,
    ) -> Result<Transform> {
        if source_frame == target_frame {
            return Ok(Transform::identity(source_frame, stamp));
        }

        // Breadth-first search over the frame graph.
        let mut visited: IndexSet<String> = IndexSet::new();
        let mut queue = VecDeque::new();
        visited.insert(source_frame.to_string());
        queue.push_back(Transform::identity(source_frame, stamp));

        while let Some(chain) = queue.pop_front() {
            for edge in self.edges_from(&chain.target_frame) {
                if !visited.insert(edge.target_frame.clone()) {
                    continue;
                }

                let next = chain.then(&edge)?;
                if next.target_frame == target_frame {
                    debug!(
                        source = %source_frame,
                        target = %target_frame,
                        "Resolved static transform"
                    );
                    return Ok(next.at(stamp));
                }
                queue.push_back(next);
            }
        }

        bail!("frames '{source_frame}' and '{target_frame}' are not connected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Header;

    fn resolver() -> StaticFrameResolver {
        StaticFrameResolver::new()
            .with_transform(Transform::from_translation("base", "sensor", [1.0, 0.0, 0.0]))
            .with_transform(Transform::from_translation("sensor", "optical", [0.0, 2.0, 0.0]))
    }

    #[test]
    fn test_direct_and_inverse_lookup() {
        let resolver = resolver();
        let stamp = Duration::from_millis(10);

        let tf = resolver.resolve("base", "sensor", stamp).unwrap();
        assert_eq!(tf.translation, [1.0, 0.0, 0.0]);
        assert_eq!(tf.stamp, stamp);

        let tf = resolver.resolve("sensor", "base", stamp).unwrap();
        assert_eq!(tf.source_frame, "sensor");
        assert_eq!(tf.target_frame, "base");
        assert_eq!(tf.apply_point([0.0; 3]), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_chained_lookup() {
        let resolver = resolver();
        let tf = resolver
            .resolve("optical", "base", Duration::from_millis(1))
            .unwrap();

        assert_eq!(tf.source_frame, "optical");
        assert_eq!(tf.target_frame, "base");
        assert_eq!(tf.apply_point([0.0; 3]), [-1.0, -2.0, 0.0]);
    }

    #[test]
    fn test_unknown_frame() {
        let resolver = resolver();
        assert!(
            resolver
                .resolve("base", "missing", Duration::from_millis(1))
                .is_err()
        );
    }

    #[test]
    fn test_transform_record_keeps_stamp() {
        let resolver = resolver();
        let header = Header::new(Duration::from_millis(100), "base");
        let record = Record::from_xyz(header, &[[0.0, 0.0, 0.0]]);

        let output = transform_record(&record, "sensor", &resolver).unwrap();
        assert_eq!(output.header.frame_id, "sensor");
        assert_eq!(output.header.stamp, Duration::from_millis(100));
        assert_eq!(output.point(0), Some(&[1.0, 0.0, 0.0][..]));

        let same = transform_record(&record, "base", &resolver).unwrap();
        assert_eq!(same, record);
    }

    #[test]
    fn test_transform_record_rejects_mismatched_answer() {
        struct Liar;

        impl FrameResolver for Liar {
            fn resolve(&self, _: &str, _: &str, stamp: Duration) -> Result<Transform> {
                Ok(Transform::identity("elsewhere", stamp))
            }
        }

        let header = Header::new(Duration::from_millis(100), "base");
        let record = Record::from_xyz(header, &[[0.0, 0.0, 0.0]]);
        assert!(transform_record(&record, "sensor", &Liar).is_err());
    }
}
