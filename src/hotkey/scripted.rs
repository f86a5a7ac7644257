//! Scripted event source for tests
//!
//! Replays a fixed list of key events, then either blocks until closed
//! or fails with a stream error. A shared [`Observer`] records opens,
//! closes, and whether the hook has been released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::keys::{HeldModifiers, KeyCode, ModifierState};
use super::source::{EventSource, Hook, HookError, KeyEvent, StreamError};

/// How the script ends once every event has been read
#[derive(Debug, Clone)]
pub enum Ending {
    /// Block until `close()`
    Block,
    /// Fail with `StreamError::Other`
    Fail(String),
}

/// One-shot flag that other threads can wait on
#[derive(Debug, Default)]
pub struct Latch {
    set: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    pub fn set(&self) {
        *self.set.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// True if the latch was set within `timeout`
    pub fn wait(&self, timeout: Duration) -> bool {
        let set = self.set.lock().unwrap();
        let (set, _) = self
            .cv
            .wait_timeout_while(set, timeout, |set| !*set)
            .unwrap();
        *set
    }

    fn wait_forever(&self) {
        let set = self.set.lock().unwrap();
        let _set = self.cv.wait_while(set, |set| !*set).unwrap();
    }
}

/// Holds `open()` until released, so tests can look at a daemon that
/// is still connecting
#[derive(Debug, Default)]
pub struct OpenGate {
    entered: Latch,
    released: Latch,
}

impl OpenGate {
    /// Wait until `open()` is parked at the gate
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.wait(timeout)
    }

    pub fn release(&self) {
        self.released.set();
    }

    fn pass(&self) {
        self.entered.set();
        self.released.wait_forever();
    }
}

#[derive(Debug, Default)]
pub struct Observer {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub released: AtomicBool,
    idle: Latch,
    closed: Latch,
}

impl Observer {
    /// Wait until the reader has consumed every scripted event and
    /// come back for more
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.idle.wait(timeout)
    }

    /// Wait until the hook has been closed
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.closed.wait(timeout)
    }
}

pub struct ScriptedSource {
    events: Vec<KeyEvent>,
    ending: Ending,
    open_error: Option<HookError>,
    gate: Option<Arc<OpenGate>>,
    close_delay: Duration,
    observer: Arc<Observer>,
}

impl ScriptedSource {
    pub fn new(events: Vec<KeyEvent>) -> Self {
        Self {
            events,
            ending: Ending::Block,
            open_error: None,
            gate: None,
            close_delay: Duration::ZERO,
            observer: Arc::new(Observer::default()),
        }
    }

    pub fn failing_open(error: HookError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    /// Block `open()` on `gate` until the test releases it
    pub fn gated(mut self, gate: Arc<OpenGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Keep a reader woken by `close()` busy for `delay` before it
    /// reports `Closed`
    pub fn close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn observer(&self) -> Arc<Observer> {
        Arc::clone(&self.observer)
    }
}

impl EventSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&mut self) -> Result<Arc<dyn Hook>, HookError> {
        self.observer.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some(err) = self.open_error.clone() {
            return Err(err);
        }
        Ok(Arc::new(ScriptedHook {
            events: Mutex::new(self.events.iter().copied().collect()),
            ending: self.ending.clone(),
            close_delay: self.close_delay,
            closed: Mutex::new(false),
            closed_cv: Condvar::new(),
            observer: Arc::clone(&self.observer),
        }))
    }
}

struct ScriptedHook {
    events: Mutex<VecDeque<KeyEvent>>,
    ending: Ending,
    close_delay: Duration,
    closed: Mutex<bool>,
    closed_cv: Condvar,
    observer: Arc<Observer>,
}

impl Hook for ScriptedHook {
    fn read_next(&self) -> Result<KeyEvent, StreamError> {
        if *self.closed.lock().unwrap() {
            return Err(StreamError::Closed);
        }
        if let Some(event) = self.events.lock().unwrap().pop_front() {
            return Ok(event);
        }

        self.observer.idle.set();
        match &self.ending {
            Ending::Fail(reason) => Err(StreamError::Other(reason.clone())),
            Ending::Block => {
                {
                    let closed = self.closed.lock().unwrap();
                    let _closed = self.closed_cv.wait_while(closed, |closed| !*closed).unwrap();
                }
                thread::sleep(self.close_delay);
                Err(StreamError::Closed)
            }
        }
    }

    fn close(&self) {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.observer.closes.fetch_add(1, Ordering::SeqCst);
            self.observer.closed.set();
        }
        self.closed_cv.notify_all();
    }
}

impl Drop for ScriptedHook {
    fn drop(&mut self) {
        self.observer.released.store(true, Ordering::SeqCst);
    }
}

/// Build press/release events from keysym-level steps, tracking
/// modifiers the way a real adapter does
pub fn key_sequence(steps: &[(u32, bool)]) -> Vec<KeyEvent> {
    let mut held = HeldModifiers::new();
    steps
        .iter()
        .map(|&(keysym, is_press)| {
            let modifier_state: ModifierState = held.update(keysym, keysym, is_press);
            let key_code = KeyCode::from_keysym(keysym);
            if is_press {
                KeyEvent::press(key_code, modifier_state)
            } else {
                KeyEvent::release(key_code, modifier_state)
            }
        })
        .collect()
}
