//! Single-slot handoff from the listener thread to the consumer loop
//!
//! The listener calls [`DispatchBridge::signal`]; the consumer drains the
//! slot through its [`Dispatcher`], which owns the application callback.
//! Signals that arrive before the consumer drains collapse into one
//! delivery, so repeated presses never queue up stale notifications.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, trace};

/// Shared slot between exactly one producer and one consumer
#[derive(Debug)]
pub struct DispatchBridge {
    pending: AtomicBool,
    consumer_alive: AtomicBool,
    signals: AtomicU64,
    wake: Notify,
}

impl DispatchBridge {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            consumer_alive: AtomicBool::new(true),
            signals: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    /// Mark a notification pending. No-op once the consumer is gone.
    pub fn signal(&self) {
        if !self.consumer_alive.load(Ordering::Acquire) {
            trace!("consumer gone, dropping hotkey signal");
            return;
        }
        self.signals.fetch_add(1, Ordering::Relaxed);
        if self.pending.swap(true, Ordering::AcqRel) {
            trace!("hotkey signal coalesced with pending notification");
        }
        self.wake.notify_one();
    }

    /// Take the pending notification. True at most once per burst of signals.
    pub fn drain(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Signals accepted so far, coalesced ones included
    pub fn signal_count(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer_alive.load(Ordering::Acquire)
    }

    fn detach_consumer(&self) {
        self.consumer_alive.store(false, Ordering::Release);
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for DispatchBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a [`DispatchBridge`]
///
/// Owns the application callback and is deliberately not `Send`: the
/// callback only ever runs on the thread that drives this dispatcher.
pub struct Dispatcher {
    bridge: Arc<DispatchBridge>,
    callback: Box<dyn FnMut()>,
    deliveries: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new<F>(bridge: Arc<DispatchBridge>, callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self {
            bridge,
            callback: Box::new(callback),
            deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take the pending notification without running the callback
    pub fn drain(&self) -> bool {
        self.bridge.drain()
    }

    /// Run the callback if a notification is pending. Never blocks.
    pub fn tick(&mut self) -> bool {
        if !self.bridge.drain() {
            return false;
        }
        let delivered = self.deliveries.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(delivered, "dispatching hotkey callback");
        (self.callback)();
        true
    }

    /// Wait for the next notification and run the callback once
    pub async fn dispatch_one(&mut self) {
        loop {
            if self.tick() {
                return;
            }
            self.bridge.wake.notified().await;
        }
    }

    /// Dispatch notifications forever
    pub async fn run(&mut self) {
        loop {
            self.dispatch_one().await;
        }
    }

    /// Signals the producer has raised on this dispatcher's bridge
    pub fn signal_count(&self) -> u64 {
        self.bridge.signal_count()
    }

    /// Shared count of callbacks run so far
    pub fn deliveries(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.deliveries)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bridge", &self.bridge)
            .field("signals", &self.bridge.signal_count())
            .field("deliveries", &self.deliveries.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.bridge.detach_consumer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::thread;

    use tokio_test::{assert_pending, assert_ready, task};

    fn counting_dispatcher() -> (Arc<DispatchBridge>, Dispatcher, Rc<Cell<u32>>) {
        let bridge = Arc::new(DispatchBridge::new());
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let dispatcher = Dispatcher::new(Arc::clone(&bridge), move || {
            counter.set(counter.get() + 1)
        });
        (bridge, dispatcher, calls)
    }

    #[test]
    fn test_drain_without_signal() {
        let bridge = DispatchBridge::new();
        assert!(!bridge.drain());
    }

    #[test]
    fn test_signals_coalesce_into_one_delivery() {
        let bridge = DispatchBridge::new();
        for _ in 0..5 {
            bridge.signal();
        }
        assert!(bridge.drain());
        assert!(!bridge.drain());
        assert!(!bridge.drain());

        bridge.signal();
        assert!(bridge.drain());
        assert_eq!(bridge.signal_count(), 6);
    }

    #[test]
    fn test_tick_runs_callback_once() {
        let (bridge, mut dispatcher, calls) = counting_dispatcher();
        bridge.signal();
        bridge.signal();

        assert!(dispatcher.tick());
        assert!(!dispatcher.tick());
        assert_eq!(calls.get(), 1);
        assert_eq!(dispatcher.deliveries().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_signal_after_consumer_dropped_is_noop() {
        let (bridge, dispatcher, _calls) = counting_dispatcher();
        drop(dispatcher);
        assert!(!bridge.has_consumer());

        bridge.signal();
        assert!(!bridge.drain());
        assert_eq!(bridge.signal_count(), 0);
    }

    #[test]
    fn test_dispatch_one_waits_for_signal() {
        let (bridge, mut dispatcher, calls) = counting_dispatcher();
        let mut pending = task::spawn(dispatcher.dispatch_one());

        assert_pending!(pending.poll());
        bridge.signal();
        assert!(pending.is_woken());
        assert_ready!(pending.poll());
        drop(pending);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_concurrent_signals_are_never_lost() {
        let (bridge, mut dispatcher, calls) = counting_dispatcher();
        let producer_bridge = Arc::clone(&bridge);
        let producer = thread::spawn(move || {
            for _ in 0..10_000 {
                producer_bridge.signal();
            }
        });

        let mut delivered = 0;
        while !producer.is_finished() {
            if dispatcher.tick() {
                delivered += 1;
            }
        }
        producer.join().unwrap();
        // anything signalled after the last tick is still pending
        if dispatcher.tick() {
            delivered += 1;
        }

        assert!(delivered >= 1);
        assert_eq!(calls.get(), delivered);
        assert!(!dispatcher.tick());
    }
}
