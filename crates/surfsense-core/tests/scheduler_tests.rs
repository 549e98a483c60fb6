//! Tests for the beat schedule and scheduler loop

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use surfsense_core::{BeatSchedule, BeatScheduler, MemoryBroker, ScheduleEntry, TaskBroker};
use tokio_util::sync::CancellationToken;

async fn pending_names(broker: &MemoryBroker) -> Vec<String> {
    let mut names = Vec::new();
    while let Some(task) = broker.claim().await.unwrap() {
        names.push(task.name.clone());
        broker.complete(&task).await.unwrap();
    }
    names
}

#[tokio::test(start_paused = true)]
async fn test_entries_fire_once_per_period() {
    let broker = MemoryBroker::new();
    let schedule: BeatSchedule = "fast@10s,slow@25s".parse().unwrap();
    let scheduler = BeatScheduler::new(Arc::new(broker.clone()), schedule);
    let shutdown = CancellationToken::new();

    let run = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    // Nothing fires before the first period elapses
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(pending_names(&broker).await.is_empty());

    // t = 51s: fast at 10, 20, 30, 40, 50; slow at 25, 50
    tokio::time::sleep(Duration::from_secs(46)).await;
    let names = pending_names(&broker).await;
    assert_eq!(names.iter().filter(|n| *n == "fast").count(), 5);
    assert_eq!(names.iter().filter(|n| *n == "slow").count(), 2);

    shutdown.cancel();
    assert_eq!(run.await.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_empty_schedule_waits_for_shutdown() {
    let scheduler = BeatScheduler::new(Arc::new(MemoryBroker::new()), BeatSchedule::default());
    let shutdown = CancellationToken::new();
    let run = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(!run.is_finished());
    shutdown.cancel();
    assert_eq!(run.await.unwrap(), 0);
}

proptest! {
    #[test]
    fn prop_second_intervals_parse(task in "[a-z][a-z_.]{0,20}", secs in 1u64..100_000) {
        let entry = ScheduleEntry::parse(&format!("{task}@{secs}s")).unwrap();
        prop_assert_eq!(entry.task, task);
        prop_assert_eq!(entry.every, Duration::from_secs(secs));
    }

    #[test]
    fn prop_display_reparses_to_same_period(millis in 1u64..10_000_000) {
        let entry = ScheduleEntry::new("tick", Duration::from_millis(millis));
        let reparsed = ScheduleEntry::parse(&entry.to_string()).unwrap();
        prop_assert_eq!(reparsed, entry);
    }
}
