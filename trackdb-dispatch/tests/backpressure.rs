mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{probe_engine, wait_until, Gate, Probe, TIMEOUT};
use trackdb_dispatch::DispatchConfig;

#[test]
fn producer_blocks_while_queue_is_full() {
    let (mut engine, log) = probe_engine(DispatchConfig::default().queue_capacity(2));
    let dispatcher = engine.dispatcher().clone();
    assert_eq!(dispatcher.queue_capacity(), 2);

    let gate = Gate::hold(&dispatcher);
    for tag in 0..2u32 {
        dispatcher
            .call_async("fill", move |probe: &Probe| probe.record(tag))
            .unwrap();
    }
    assert_eq!(dispatcher.stats().queue_len, 2);

    let accepted = Arc::new(AtomicBool::new(false));
    let producer = {
        let dispatcher = dispatcher.clone();
        let accepted = Arc::clone(&accepted);
        thread::spawn(move || {
            dispatcher
                .call_async("overflow", |probe: &Probe| probe.record(2))
                .unwrap();
            accepted.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!accepted.load(Ordering::SeqCst), "producer should be parked");

    gate.release();
    assert!(wait_until(TIMEOUT, || accepted.load(Ordering::SeqCst)));
    producer.join().unwrap();

    engine.shutdown();
    assert_eq!(log.entries(), vec![0, 1, 2]);
    let stats = engine.stats();
    assert_eq!(stats.queue_high_water, 2);
    assert_eq!(stats.enqueued, 4);
}

#[test]
fn capacity_of_zero_is_clamped_to_one() {
    let (engine, _log) = probe_engine(DispatchConfig::default().queue_capacity(0));
    assert_eq!(engine.dispatcher().queue_capacity(), 1);
    let value = engine
        .dispatcher()
        .submit_sync("tiny", |_: &Probe| 1)
        .unwrap();
    assert_eq!(value, 1);
}
