//! This library filters point records in a chosen coordinate frame. It
//! pairs each record with an optional subset of point indices by
//! timestamp, transforms the record into the input frame, runs a filter,
//! transforms the result into the output frame and publishes it. Frames
//! and filter parameters can be changed while the node runs.
//!
//! # Usage
//!
//! ```rust
//! use reframe_core::{
//!     Configuration, FilterNode, Header, IndexSubset, Input, NodeConfig, Record,
//!     StaticFrameResolver, Transform, batch,
//! };
//! use futures::stream;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> eyre::Result<()> {
//! let config = NodeConfig::from_yaml(
//!     r#"
//! sync:
//!   use_indices: true
//! frames:
//!   input_frame: base_link
//! "#,
//! )?;
//!
//! // The sensor is mounted one meter above the robot base.
//! let resolver = StaticFrameResolver::new()
//!     .with_transform(Transform::from_translation("lidar", "base_link", [0.0, 0.0, 1.0]));
//!
//! // Keep the selected points that are above the ground.
//! let filter = |record: &Record,
//!               indices: Option<&IndexSubset>,
//!               _: &Configuration|
//!  -> eyre::Result<Record> {
//!     let points: Vec<[f64; 3]> = indices
//!         .map(|subset| subset.indices.clone())
//!         .unwrap_or_else(|| (0..record.len()).collect())
//!         .into_iter()
//!         .filter_map(|index| record.point(index))
//!         .filter(|point| point[2] > 0.0)
//!         .map(|point| [point[0], point[1], point[2]])
//!         .collect();
//!     Ok(Record::from_xyz(record.header.clone(), &points))
//! };
//!
//! let (sink, mut output) = mpsc::unbounded_channel::<Record>();
//! let node = FilterNode::new(&config, filter, resolver, sink)?;
//!
//! let stamp = Duration::from_millis(100);
//! let inputs = stream::iter([
//!     Input::from(Record::from_xyz(
//!         Header::new(stamp, "lidar"),
//!         &[[1.0, 0.0, -2.0], [2.0, 0.0, 0.5], [3.0, 0.0, -0.5]],
//!     )),
//!     Input::from(IndexSubset::new(Header::new(stamp, "lidar"), vec![0, 1])),
//! ]);
//!
//! let (updates_tx, updates_rx) = flume::bounded(8);
//! updates_tx.send(batch([("filter_limit_max", 2.0_f64)]))?;
//!
//! let stats = node.run(inputs, updates_rx).await?;
//! assert_eq!(stats.published, 1);
//!
//! // Published in the record's own frame, with its own timestamp.
//! let filtered = output.recv().await.unwrap();
//! assert_eq!(filtered.header.frame_id, "lidar");
//! assert_eq!(filtered.stamp(), stamp);
//! assert_eq!(filtered.len(), 1);
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod config;
pub mod diagnostics;
pub mod filter;
mod node;
pub mod pipeline;
pub mod publisher;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod sync;
pub mod transform;
mod types;

pub use config::{Configuration, INPUT_FRAME, OUTPUT_FRAME, ParamValue, UpdateBatch, batch};
pub use diagnostics::{Diagnostics, EvictReason, Notice, Stage, StreamKind, TracingDiagnostics};
pub use filter::{FilterAlgorithm, Identity};
pub use node::{FilterNode, Input, NodeStats};
pub use pipeline::{Abort, ReframingPipeline};
pub use publisher::{Publisher, Sink};
pub use resolver::{FrameResolver, StaticFrameResolver, transform_record};
pub use settings::{FrameConfig, NodeConfig, SyncConfig};
pub use store::ConfigStore;
pub use sync::{MatchPolicy, Rejection, StreamSynchronizer, SyncStats};
pub use transform::Transform;
pub use types::*;
