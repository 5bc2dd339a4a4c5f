#![allow(dead_code)]

use std::fmt::Debug;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use deskjob_core::{BlockingScope, ForegroundSurface, HeadlessSurface, TaskEvent, TaskListener, WorkFailure};

pub const COORDINATOR: &str = "test-coordinator";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("deskjob_core=debug")
        .try_init();
}

pub fn current_thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

/// Polls `f` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    f()
}

/// One-shot latch task bodies park on until the test opens it.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, cv) = &*self.0;
        *open.lock().unwrap() = true;
        cv.notify_all();
    }

    pub fn wait(&self) {
        let (open, cv) = &*self.0;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cv.wait(guard).unwrap();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCall {
    pub blocked: bool,
    pub scope: BlockingScope,
    pub elements: Vec<String>,
    pub thread: String,
}

/// Headless surface that also records every call and the thread it came on.
#[derive(Default)]
pub struct RecordingSurface {
    inner: HeadlessSurface,
    pub calls: Mutex<Vec<SurfaceCall>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_blocked(&self, element: &str) -> bool {
        self.inner.is_blocked(element)
    }
}

impl ForegroundSurface for RecordingSurface {
    fn resolve(&self, scope: BlockingScope, target: Option<&str>) -> Vec<String> {
        self.inner.resolve(scope, target)
    }

    fn set_blocked(&self, scope: BlockingScope, elements: &[String], blocked: bool) {
        self.calls.lock().unwrap().push(SurfaceCall {
            blocked,
            scope,
            elements: elements.to_vec(),
            thread: current_thread_name(),
        });
        self.inner.set_blocked(scope, elements, blocked);
    }
}

/// Task listener recording `stage[:value]@thread` for every delivery.
#[derive(Default)]
pub struct Recorder {
    entries: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, label: String) {
        self.entries
            .lock()
            .unwrap()
            .push((label, current_thread_name()));
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(l, _)| l.clone())
            .collect()
    }

    pub fn threads(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.labels()
            .iter()
            .filter(|l| {
                l.starts_with("succeeded") || l.starts_with("failed") || l.starts_with("cancelled")
            })
            .count()
    }
}

impl<T: Debug, V: Debug> TaskListener<T, V> for Recorder {
    fn started(&self, _event: &TaskEvent<()>) {
        self.push("started".to_string());
    }

    fn progress(&self, event: &TaskEvent<V>) {
        self.push(format!("progress:{:?}", event.value().unwrap()));
    }

    fn succeeded(&self, event: &TaskEvent<T>) {
        self.push(format!("succeeded:{:?}", event.value().unwrap()));
    }

    fn failed(&self, event: &TaskEvent<WorkFailure>) {
        self.push(format!("failed:{}", event.value().unwrap()));
    }

    fn cancelled(&self, _event: &TaskEvent<()>) {
        self.push("cancelled".to_string());
    }
}
