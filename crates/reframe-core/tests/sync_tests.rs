mod common;

use common::*;
use rand::{Rng, SeedableRng, rngs::StdRng};
use reframe_core::{
    EvictReason, MatchPolicy, Notice, Rejection, StreamKind, StreamSynchronizer,
    SynchronizedPair,
};
use std::time::Duration;

fn drain_pairs(sync: &mut StreamSynchronizer) -> Vec<SynchronizedPair> {
    std::iter::from_fn(|| sync.try_match()).collect()
}

#[test]
fn test_exact_pairs_iff_identical_stamps() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let mut sync = StreamSynchronizer::new(MatchPolicy::Exact, 64).unwrap();
        let mut pairs = vec![];

        // Both streams tick every 10ms; each message may be lost.
        let mut record_stamps = vec![];
        let mut index_stamps = vec![];
        for tick in 1..=40u64 {
            let ms = tick * 10;
            if rng.random_bool(0.8) {
                record_stamps.push(ms);
            }
            if rng.random_bool(0.8) {
                index_stamps.push(ms);
            }
        }

        // Interleave arrivals in a random but per-stream ordered way.
        let (mut ri, mut ii) = (0, 0);
        while ri < record_stamps.len() || ii < index_stamps.len() {
            let take_record =
                ii >= index_stamps.len() || (ri < record_stamps.len() && rng.random_bool(0.5));
            if take_record {
                sync.push_record(create_record(record_stamps[ri], "base"))
                    .unwrap();
                ri += 1;
            } else {
                let _ = sync.push_indices(create_indices(index_stamps[ii], "base"));
                ii += 1;
            }
            pairs.extend(drain_pairs(&mut sync));
        }

        for pair in &pairs {
            let indices = pair.indices.as_ref().unwrap();
            assert_eq!(pair.stamp(), indices.stamp());
        }
        assert_timestamp_ordering(&pairs);

        // Every emitted pair had a stamp present in both streams.
        for pair in &pairs {
            let ms = pair.stamp().as_millis() as u64;
            assert!(record_stamps.contains(&ms) && index_stamps.contains(&ms));
        }
    }
}

#[test]
fn test_exact_unmatched_record_retained_until_overflow() {
    let mut sync = StreamSynchronizer::new(MatchPolicy::Exact, 3).unwrap();

    sync.push_record(create_record(5, "base")).unwrap();
    assert!(sync.try_match().is_none());
    assert_eq!(sync.stats().buffered_records, 1);

    // Later records with no indices either; the buffer fills up.
    sync.push_record(create_record(6, "base")).unwrap();
    sync.push_record(create_record(7, "base")).unwrap();
    assert!(sync.try_match().is_none());
    assert!(sync.take_notices().is_empty());

    sync.push_record(create_record(8, "base")).unwrap();
    assert!(sync.try_match().is_none());
    assert_eq!(
        sync.take_notices(),
        vec![Notice::Evicted {
            stream: StreamKind::Records,
            stamp: Duration::from_millis(5),
            reason: EvictReason::Overflow,
        }]
    );
    assert_eq!(sync.stats().pairs_emitted, 0);
}

#[test]
fn test_exact_match_supersedes_older_records() {
    let mut sync = StreamSynchronizer::new(MatchPolicy::Exact, 4).unwrap();

    sync.push_record(create_record(10, "base")).unwrap();
    sync.push_record(create_record(20, "base")).unwrap();
    sync.push_indices(create_indices(20, "base")).unwrap();

    let pair = sync.try_match().unwrap();
    assert_eq!(pair.stamp(), Duration::from_millis(20));
    assert_eq!(
        sync.take_notices(),
        vec![Notice::Evicted {
            stream: StreamKind::Records,
            stamp: Duration::from_millis(10),
            reason: EvictReason::Superseded,
        }]
    );

    // The match at 20 committed; indices at 10 can never be paired now.
    assert!(matches!(
        sync.push_indices(create_indices(10, "base")),
        Err(Rejection::Late { .. })
    ));
}

#[test]
fn test_approximate_pairs_within_tolerance() {
    let tolerance = Duration::from_millis(15);
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..50 {
        let mut sync = StreamSynchronizer::new(MatchPolicy::Approximate { tolerance }, 8).unwrap();
        let mut pairs = vec![];

        // Records every 50ms, indices jittered around them and sometimes
        // missing.
        let record_stamps: Vec<u64> = (1..=30).map(|i| i * 50).collect();
        let rng_cell = std::cell::RefCell::new(&mut rng);
        let mut index_stamps: Vec<u64> = record_stamps
            .iter()
            .filter(|_| rng_cell.borrow_mut().random_bool(0.85))
            .map(|&ms| (ms as i64 + rng_cell.borrow_mut().random_range(-25..=25)) as u64)
            .collect();
        index_stamps.sort_unstable();
        index_stamps.dedup();

        let mut events: Vec<(u64, bool)> = record_stamps
            .iter()
            .map(|&ms| (ms + rng_cell.borrow_mut().random_range(0..=10), true))
            .chain(
                index_stamps
                    .iter()
                    .map(|&ms| (ms + rng_cell.borrow_mut().random_range(0..=10), false)),
            )
            .collect();
        // Arrival order; each stream stays ordered because the delays are
        // smaller than the spacing.
        events.sort_by_key(|&(arrival, _)| arrival);

        let (mut ri, mut ii) = (0, 0);
        for (_, is_record) in events {
            if is_record {
                sync.push_record(create_record(record_stamps[ri], "base"))
                    .unwrap();
                ri += 1;
            } else {
                let _ = sync.push_indices(create_indices(index_stamps[ii], "base"));
                ii += 1;
            }
            pairs.extend(drain_pairs(&mut sync));
        }

        assert!(!pairs.is_empty());
        for pair in &pairs {
            let indices = pair.indices.as_ref().unwrap();
            assert!(
                pair.stamp().abs_diff(indices.stamp()) <= tolerance,
                "record {:?} paired with indices {:?}",
                pair.stamp(),
                indices.stamp()
            );
        }
        assert_timestamp_ordering(&pairs);

        let stats = sync.stats();
        assert!(stats.buffered_records <= 8 && stats.buffered_indices <= 8);
    }
}

#[test]
fn test_approximate_prefers_closest() {
    let tolerance = Duration::from_millis(30);
    let mut sync = StreamSynchronizer::new(MatchPolicy::Approximate { tolerance }, 4).unwrap();

    sync.push_indices(create_indices(80, "base")).unwrap();
    sync.push_indices(create_indices(95, "base")).unwrap();
    sync.push_indices(create_indices(120, "base")).unwrap();
    sync.push_record(create_record(100, "base")).unwrap();

    let pair = sync.try_match().unwrap();
    assert_eq!(pair.indices.unwrap().stamp(), Duration::from_millis(95));
    assert_eq!(sync.stats().buffered_indices, 1);
}

#[test]
fn test_passthrough_ignores_indices() {
    let mut sync = StreamSynchronizer::new(MatchPolicy::Passthrough, 2).unwrap();

    for ms in [30, 10, 20] {
        sync.push_record(create_record(ms, "base")).unwrap();
        let pair = sync.try_match().unwrap();
        assert_eq!(pair.stamp(), Duration::from_millis(ms));
        assert!(pair.indices.is_none());
    }
    assert_eq!(
        sync.push_indices(create_indices(40, "base")),
        Err(Rejection::Disabled)
    );
}
