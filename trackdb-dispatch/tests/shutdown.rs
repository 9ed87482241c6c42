mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{probe_engine, wait_until, Gate, Probe, TIMEOUT};
use trackdb_dispatch::{
    DispatchConfig, DispatchError, Engine, MailboxError, MainThreadMailbox, ShutdownPolicy,
    WorkerState,
};

#[test]
fn submissions_after_shutdown_are_rejected_promptly() {
    let (mut engine, _log) = probe_engine(DispatchConfig::default());
    let dispatcher = engine.dispatcher().clone();
    assert_eq!(dispatcher.state(), WorkerState::Running);

    engine.shutdown();
    assert_eq!(dispatcher.state(), WorkerState::Stopped);

    assert_eq!(
        dispatcher.call_async("late", |_: &Probe| {}),
        Err(DispatchError::QueueRejected)
    );
    assert_eq!(
        dispatcher.submit_sync("late-sync", |_: &Probe| 1),
        Err(DispatchError::QueueRejected)
    );
    assert_eq!(dispatcher.stats().rejected, 2);
}

#[test]
fn drain_runs_every_queued_task() {
    let (mut engine, log) = probe_engine(DispatchConfig::default());
    let dispatcher = engine.dispatcher().clone();
    let gate = Gate::hold(&dispatcher);
    for tag in 0..10u32 {
        dispatcher
            .call_async("queued", move |probe: &Probe| probe.record(tag))
            .unwrap();
    }
    let releaser = gate.release_after(Duration::from_millis(50));

    let report = engine.shutdown_with(ShutdownPolicy::Drain);
    releaser.join().unwrap();
    assert_eq!(report.discarded, 0);
    assert_eq!(report.executed, 11);
    assert_eq!(log.entries(), (0..10).collect::<Vec<_>>());
}

#[test]
fn discard_drops_queued_tasks_and_fails_their_sync_callers() {
    let (mut engine, log) = probe_engine(DispatchConfig::default());
    let dispatcher = engine.dispatcher().clone();
    let gate = Gate::hold(&dispatcher);
    for tag in 0..5u32 {
        dispatcher
            .call_async("queued", move |probe: &Probe| probe.record(tag))
            .unwrap();
    }
    let sync_caller = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || dispatcher.submit_sync("doomed", |probe: &Probe| probe.record(99)))
    };
    assert!(wait_until(TIMEOUT, || dispatcher.stats().enqueued == 7));

    let releaser = gate.release_after(Duration::from_millis(50));
    let report = engine.shutdown_with(ShutdownPolicy::Discard);
    releaser.join().unwrap();

    assert_eq!(sync_caller.join().unwrap(), Err(DispatchError::QueueRejected));
    assert_eq!(report.discarded, 6);
    assert_eq!(report.executed, 1);
    assert_eq!(dispatcher.stats().discarded, 6);
    assert!(log.entries().is_empty());
}

#[test]
fn producer_blocked_on_full_queue_is_released() {
    let (mut engine, _log) = probe_engine(DispatchConfig::default().queue_capacity(1));
    let dispatcher = engine.dispatcher().clone();
    let gate = Gate::hold(&dispatcher);
    dispatcher.call_async("fill", |_: &Probe| {}).unwrap();

    let producer = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || dispatcher.call_async("blocked", |_: &Probe| {}))
    };
    thread::sleep(Duration::from_millis(50));

    let releaser = gate.release_after(Duration::from_millis(50));
    engine.shutdown_with(ShutdownPolicy::Discard);
    releaser.join().unwrap();
    assert_eq!(producer.join().unwrap(), Err(DispatchError::QueueRejected));
}

#[test]
fn resource_is_released_on_the_worker() {
    let (mut engine, log) = probe_engine(DispatchConfig::default().worker_name("probe-db"));
    assert_eq!(log.dropped_on(), None);
    engine.shutdown();
    assert_eq!(log.dropped_on().as_deref(), Some("probe-db"));
}

#[test]
fn dropping_the_engine_shuts_it_down() {
    let (engine, log) = probe_engine(DispatchConfig::default());
    let dispatcher = engine.dispatcher().clone();
    dispatcher
        .call_async("before-drop", |probe: &Probe| probe.record(1))
        .unwrap();
    drop(engine);
    assert_eq!(dispatcher.state(), WorkerState::Stopped);
    assert_eq!(log.entries(), vec![1]);
    assert!(log.dropped_on().is_some());
}

#[test]
fn shutdown_on_main_serves_mailbox_until_worker_exits() {
    let mailbox = Arc::new(MainThreadMailbox::new());
    let mut engine = Engine::builder(|| Ok::<_, String>(()))
        .mailbox(&mailbox)
        .start()
        .unwrap();
    let outcome = Arc::new(Mutex::new(None));

    {
        let mailbox = Arc::clone(&mailbox);
        let outcome = Arc::clone(&outcome);
        engine
            .dispatcher()
            .call_async("report-back", move |_| {
                thread::sleep(Duration::from_millis(20));
                *outcome.lock().unwrap() = Some(mailbox.post_sync("deliver", || 7));
            })
            .unwrap();
    }

    let report = engine.shutdown();
    assert_eq!(report.executed, 1);
    assert_eq!(*outcome.lock().unwrap(), Some(Ok(7)));
    assert!(mailbox.is_closed());

    let late = {
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || mailbox.post_async("late", || {}))
    };
    assert_eq!(late.join().unwrap(), Err(MailboxError::MailboxRejected));
}
