use futures::{StreamExt, stream};
use reframe_core::{
    Configuration, FilterNode, Header, IndexSubset, Input, NodeConfig, Record,
    StaticFrameResolver, Transform, batch,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// Keep points whose z lies in [filter_limit_min, filter_limit_max].
fn pass_through_z(
    record: &Record,
    _indices: Option<&IndexSubset>,
    config: &Configuration,
) -> eyre::Result<Record> {
    let min = config
        .get("filter_limit_min")
        .and_then(|value| value.as_f64())
        .unwrap_or(f64::NEG_INFINITY);
    let max = config
        .get("filter_limit_max")
        .and_then(|value| value.as_f64())
        .unwrap_or(f64::INFINITY);

    let points: Vec<[f64; 3]> = record
        .points()
        .filter(|point| (min..=max).contains(&point[2]))
        .map(|point| [point[0], point[1], point[2]])
        .collect();
    Ok(Record::from_xyz(record.header.clone(), &points))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reframe_core=info".parse()?))
        .init();

    let config = NodeConfig::from_yaml(
        r#"
sync:
  use_indices: false
frames:
  input_frame: base_link
  output_frame: map
"#,
    )?;

    let resolver = StaticFrameResolver::new()
        .with_transform(Transform::from_translation(
            "lidar",
            "base_link",
            [0.0, 0.0, 0.8],
        ))
        .with_transform(Transform::from_yaw(
            "base_link",
            "map",
            std::f64::consts::FRAC_PI_4,
            [10.0, 5.0, 0.0],
        ));

    let (sink, mut output) = mpsc::unbounded_channel::<Record>();
    let node = FilterNode::new(&config, pass_through_z, resolver, sink)?;

    // Two scans from the front lidar and one from a frame nobody knows.
    let scans = stream::iter([
        Record::from_xyz(
            Header::new(Duration::from_millis(1000), "lidar"),
            &[[1.0, 0.0, -0.5], [2.0, 1.0, 0.1], [3.0, 0.0, 4.0]],
        ),
        Record::from_xyz(
            Header::new(Duration::from_millis(1100), "lidar"),
            &[[1.5, 0.0, 0.0]],
        ),
        Record::from_xyz(
            Header::new(Duration::from_millis(1200), "rear_lidar"),
            &[[0.0, 0.0, 0.0]],
        ),
    ]);
    let no_indices = stream::empty::<IndexSubset>();

    let inputs = stream::select(scans.map(Input::from), no_indices.map(Input::from));

    let (updates_tx, updates_rx) = flume::bounded(8);
    updates_tx.send(batch([("filter_limit_max", 2.0_f64)]))?;

    let stats = node.run(inputs, updates_rx).await?;
    println!("{stats:#?}");

    while let Ok(record) = output.try_recv() {
        println!(
            "{:?} in '{}': {:?}",
            record.stamp(),
            record.header.frame_id,
            record.points().collect::<Vec<_>>()
        );
    }

    Ok(())
}
