//! Property tests for partial merge and channel ordering.

use nscontrol::{Control, Merge, Observer, ObserverDelta, RT_RING_CAPACITY, ShmControl};
use nscontrol_common::config::SegmentConfig;
use nscontrol_common::shm::consts::COMMAND_QUEUE_DEPTH;
use nscontrol_common::shm::layout::ClientType;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn test_config(tag: &str) -> SegmentConfig {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    SegmentConfig::named(format!(
        "nsc_prop_{tag}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

fn delta() -> impl Strategy<Value = ObserverDelta> {
    (
        proptest::option::of(-90.0f64..90.0),
        proptest::option::of(-180.0f64..180.0),
        proptest::option::of(1900i32..2100),
        proptest::option::of("[A-Za-z]{1,20}"),
    )
        .prop_map(|(latitude, longitude, year, home_body)| ObserverDelta {
            latitude,
            longitude,
            year,
            home_body: home_body.map(|s| s.as_str().into()),
            ..Default::default()
        })
}

proptest! {
    #[test]
    fn merge_is_last_writer_wins_per_field(first in delta(), second in delta()) {
        let mut observer = Observer::default();
        observer.merge(&first);
        observer.merge(&second);

        let base = Observer::default();
        prop_assert_eq!(observer.latitude, second.latitude.or(first.latitude).unwrap_or(base.latitude));
        prop_assert_eq!(observer.longitude, second.longitude.or(first.longitude).unwrap_or(base.longitude));
        prop_assert_eq!(observer.year, second.year.or(first.year).unwrap_or(base.year));
        prop_assert_eq!(
            observer.home_body,
            second.home_body.or(first.home_body).unwrap_or(base.home_body)
        );
        prop_assert_eq!(observer.timezone, base.timezone);
    }

    #[test]
    fn merge_of_empty_delta_is_identity(first in delta()) {
        let mut observer = Observer::default();
        observer.merge(&first);
        let before = observer;
        prop_assert_eq!(observer.merge(&ObserverDelta::default()), 0);
        prop_assert_eq!(observer, before);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ring_preserves_write_order(
        payloads in proptest::collection::vec("[a-z0-9 ]{0,40}", 0..=RT_RING_CAPACITY),
        reads in 0usize..=RT_RING_CAPACITY,
    ) {
        let control = ShmControl::open(&test_config("ring"), ClientType::Engine).unwrap();
        for payload in &payloads {
            prop_assert!(control.write_rt(payload.as_bytes()).unwrap());
        }
        let reads = reads.min(payloads.len());
        for expected in &payloads[..reads] {
            let command = control.read_rt().unwrap();
            prop_assert_eq!(command.map(|c| c.to_text()), Some(expected.clone()));
        }
        prop_assert_eq!(control.stats().unwrap().ring_pending, payloads.len() - reads);
    }

    #[test]
    fn queue_keeps_most_recent(count in 0usize..250) {
        let config = test_config("queue");
        let engine = ShmControl::open(&config, ClientType::Engine).unwrap();
        let console = ShmControl::open(&config, ClientType::Console).unwrap();
        engine.connect().unwrap();

        for i in 0..count {
            console.write(format!("{i}").as_bytes()).unwrap();
        }
        for i in count.saturating_sub(COMMAND_QUEUE_DEPTH)..count {
            prop_assert_eq!(engine.read().unwrap().map(|c| c.to_text()), Some(i.to_string()));
        }
        prop_assert!(engine.read().unwrap().is_none());
    }
}
