mod common;

use std::sync::Arc;
use std::thread;

use common::{probe_engine, Probe};
use trackdb_dispatch::DispatchConfig;

#[test]
fn mixed_sync_and_async_run_in_submission_order() {
    let (mut engine, log) = probe_engine(DispatchConfig::default());
    let dispatcher = engine.dispatcher().clone();

    for tag in 0..50u32 {
        if tag % 5 == 4 {
            let echoed = dispatcher
                .submit_sync("fifo-sync", move |probe: &Probe| {
                    probe.record(tag);
                    tag
                })
                .unwrap();
            assert_eq!(echoed, tag);
        } else {
            dispatcher
                .call_async("fifo-async", move |probe: &Probe| probe.record(tag))
                .unwrap();
        }
    }

    engine.shutdown();
    assert_eq!(log.entries(), (0..50).collect::<Vec<_>>());
}

#[test]
fn each_producer_keeps_its_own_order() {
    let (mut engine, log) = probe_engine(DispatchConfig::default().queue_capacity(4));
    let dispatcher = Arc::new(engine.dispatcher().clone());

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                for i in 0..25u32 {
                    let tag = producer * 1000 + i;
                    if i % 7 == 0 {
                        dispatcher
                            .submit_sync("producer-sync", move |probe: &Probe| probe.record(tag))
                            .unwrap();
                    } else {
                        dispatcher
                            .call_async("producer-async", move |probe: &Probe| probe.record(tag))
                            .unwrap();
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    engine.shutdown();
    let entries = log.entries();
    assert_eq!(entries.len(), 100);
    for producer in 0..4u32 {
        let own: Vec<u32> = entries
            .iter()
            .copied()
            .filter(|tag| tag / 1000 == producer)
            .collect();
        let expected: Vec<u32> = (0..25).map(|i| producer * 1000 + i).collect();
        assert_eq!(own, expected, "producer {} out of order", producer);
    }
}
