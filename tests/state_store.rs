//! Shared state store behaviour under concurrent readers and writers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use homeagent::config::SchedulerConfig;
use homeagent::state::{load_states, save_states};
use homeagent::{Scheduler, StateStore, Task};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A status reader on another thread never observes two tasks running at
/// the same time.
#[test]
fn reader_never_sees_concurrent_task_execution() {
    let store = StateStore::new();
    let config = SchedulerConfig {
        run_maintenance: false,
        ..SchedulerConfig::default()
    };
    let sched = Scheduler::new(store.clone(), CancellationToken::new(), config);
    for i in 0..20 {
        sched.submit_now(Task::new(format!("work{i}"), |_| {
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }));
    }

    let done = Arc::new(AtomicBool::new(false));
    let max_running = Arc::new(AtomicUsize::new(0));
    let reader = {
        let store = store.clone();
        let done = Arc::clone(&done);
        let max_running = Arc::clone(&max_running);
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let running = store
                    .acquire()
                    .tasks
                    .values()
                    .filter(|record| record.running)
                    .count();
                max_running.fetch_max(running, Ordering::SeqCst);
                std::thread::yield_now();
            }
        })
    };

    sched.start().expect("start");
    done.store(true, Ordering::SeqCst);
    reader.join().expect("reader");

    assert!(max_running.load(Ordering::SeqCst) <= 1);
    assert!(store.snapshot().tasks.values().all(|record| record.last_run > 0.0));
}

/// Collaborator values written by tasks survive a save/load cycle.
#[test]
fn task_written_values_persist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("states.json");

    let store = StateStore::new();
    let config = SchedulerConfig {
        run_maintenance: false,
        ..SchedulerConfig::default()
    };
    let sched = Scheduler::new(store.clone(), CancellationToken::new(), config);
    let writer = store.clone();
    sched.submit_now(Task::new("collector", move |args| {
        let reading = args.cloned().unwrap_or_default();
        writer.set_value("cpu_temp", reading);
        writer.append("events", "collected")?;
        Ok(())
    })
    .with_args(json!(51.2)));
    sched.start().expect("start");

    save_states(&path, &store.snapshot()).expect("save");
    let restored = StateStore::new();
    restored.restore_values(load_states(&path).expect("load").expect("present"));

    assert_eq!(restored.value("cpu_temp"), Some(json!(51.2)));
    assert_eq!(restored.value("events"), Some(json!(["collected"])));
}
