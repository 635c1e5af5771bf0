use reframe_core::{
    Configuration, FilterNode, Header, IndexSubset, NodeConfig, Notice, Record, StaticFrameResolver,
    SynchronizedPair, Transform,
};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn create_record(timestamp_ms: u64, frame: &str) -> Record {
    Record::from_xyz(
        Header::new(Duration::from_millis(timestamp_ms), frame),
        &[[1.0, 2.0, 3.0], [-4.0, 0.5, 0.25], [0.0, 0.0, 10.0]],
    )
}

#[allow(dead_code)]
pub fn create_indices(timestamp_ms: u64, frame: &str) -> IndexSubset {
    IndexSubset::new(Header::new(Duration::from_millis(timestamp_ms), frame), vec![0, 2])
}

/// A resolver knowing `base -> sensor` (rotated and shifted) and
/// `sensor -> optical`.
#[allow(dead_code)]
pub fn create_resolver() -> StaticFrameResolver {
    StaticFrameResolver::new()
        .with_transform(Transform::from_yaw(
            "base",
            "sensor",
            std::f64::consts::FRAC_PI_2,
            [0.5, -1.0, 2.0],
        ))
        .with_transform(Transform::from_translation("sensor", "optical", [0.0, 0.0, 0.1]))
}

#[allow(dead_code)]
pub fn node_config(yaml: &str) -> NodeConfig {
    NodeConfig::from_yaml(yaml).unwrap()
}

/// Keeps the points selected by the index subset, or all points without
/// one.
#[allow(dead_code)]
pub fn select_filter(
    record: &Record,
    indices: Option<&IndexSubset>,
    _config: &Configuration,
) -> eyre::Result<Record> {
    let Some(indices) = indices else {
        return Ok(record.clone());
    };

    let data = indices
        .indices
        .iter()
        .filter_map(|&index| record.point(index))
        .flatten()
        .copied()
        .collect();
    Ok(Record::new(record.header.clone(), record.fields.clone(), data))
}

/// A node wired to channels for its output and its diagnostics.
#[allow(dead_code)]
pub struct TestNode<F> {
    pub node: FilterNode<F, StaticFrameResolver, mpsc::UnboundedSender<Record>>,
    pub output: mpsc::UnboundedReceiver<Record>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

#[allow(dead_code)]
pub fn create_node<F>(config: &NodeConfig, filter: F) -> TestNode<F>
where
    F: reframe_core::FilterAlgorithm,
{
    let (tx, output) = mpsc::unbounded_channel();
    let (notice_tx, notices) = mpsc::unbounded_channel();
    let node = FilterNode::new(config, filter, create_resolver(), tx)
        .unwrap()
        .with_diagnostics(notice_tx);

    TestNode {
        node,
        output,
        notices,
    }
}

#[allow(dead_code)]
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = vec![];
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

#[allow(dead_code)]
pub fn assert_points_close(actual: &Record, expected: &Record) {
    assert_eq!(actual.data.len(), expected.data.len());
    for (a, e) in actual.data.iter().zip(&expected.data) {
        assert!((a - e).abs() < 1e-9, "expected {e}, got {a}");
    }
}

/// Check that pair stamps strictly increase.
#[allow(dead_code)]
pub fn assert_timestamp_ordering(pairs: &[SynchronizedPair]) {
    for window in pairs.windows(2) {
        assert!(
            window[0].stamp() < window[1].stamp(),
            "pairs out of order: {:?} then {:?}",
            window[0].stamp(),
            window[1].stamp()
        );
    }
}
