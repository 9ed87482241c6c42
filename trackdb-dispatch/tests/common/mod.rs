#![allow(dead_code)]
//! Test harness utilities for trackdb-dispatch integration tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use trackdb_dispatch::{DispatchConfig, Dispatcher, Engine};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Shared record of what the worker did, readable from the test thread.
#[derive(Clone, Default)]
pub struct ProbeLog {
    entries: Arc<Mutex<Vec<u32>>>,
    dropped_on: Arc<Mutex<Option<String>>>,
}

impl ProbeLog {
    pub fn entries(&self) -> Vec<u32> {
        self.entries.lock().unwrap().clone()
    }

    /// Name of the thread that dropped the probe, once it has been dropped.
    pub fn dropped_on(&self) -> Option<String> {
        self.dropped_on.lock().unwrap().clone()
    }
}

/// Stand-in resource that records each task's tag.
pub struct Probe {
    log: ProbeLog,
}

impl Probe {
    pub fn record(&self, tag: u32) {
        self.log.entries.lock().unwrap().push(tag);
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        *self.log.dropped_on.lock().unwrap() = Some(name);
    }
}

/// Start an engine over a fresh probe.
pub fn probe_engine(config: DispatchConfig) -> (Engine<Probe>, ProbeLog) {
    let log = ProbeLog::default();
    let probe_log = log.clone();
    let engine = Engine::builder(move || Ok::<_, String>(Probe { log: probe_log }))
        .config(config)
        .start()
        .expect("probe engine should start");
    (engine, log)
}

/// Keeps the worker parked inside a task until released or dropped.
pub struct Gate {
    release: Sender<()>,
    entered: Receiver<()>,
}

impl Gate {
    /// Queue a task that parks the worker, and wait until it has started.
    pub fn hold<R: 'static>(dispatcher: &Dispatcher<R>) -> Gate {
        let (release, release_rx) = crossbeam_channel::bounded::<()>(1);
        let (entered_tx, entered) = crossbeam_channel::bounded::<()>(1);
        dispatcher
            .call_async("gate", move |_| {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            })
            .expect("gate task should be accepted");
        let gate = Gate { release, entered };
        gate.entered
            .recv_timeout(TIMEOUT)
            .expect("worker never entered the gate task");
        gate
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }

    /// Release from another thread after `delay`.
    pub fn release_after(self, delay: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(delay);
            self.release();
        })
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
