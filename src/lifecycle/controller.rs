//! Hotkey daemon lifecycle controller
//!
//! Owns the event source, the installed hook, and the listener thread.
//! Every state change goes through [`Inner::transition`]; hook failures
//! end in [`DaemonState::Failed`] instead of propagating, so the host
//! application keeps working without the hotkey.
//!
//! The event source sits behind its own lock. Opening a hook can block
//! on the display server, and the state lock stays free meanwhile.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchBridge, Dispatcher};
use crate::hotkey::{matches, EventSource, Hook, HookError, HotkeyCombination, StreamError};
use crate::state::{DaemonState, FailureReason};

/// Misuse of the registration API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no hotkey registered before start")]
    NotRegistered,

    #[error("hotkey must be registered before start (daemon is {0})")]
    AlreadyStarted(DaemonState),

    #[error("daemon is {0}; construct a new one to retry")]
    Terminal(DaemonState),
}

#[derive(Clone)]
struct Registration {
    combination: HotkeyCombination,
    bridge: Arc<DispatchBridge>,
}

struct Inner {
    state: DaemonState,
    registration: Option<Registration>,
    hook: Option<Arc<dyn Hook>>,
    listener: Option<JoinHandle<()>>,
}

impl Inner {
    /// The single mutation point for the daemon state
    fn transition(&mut self, next: DaemonState, changed: &Condvar) {
        if !self.state.can_transition_to(&next) {
            warn!(from = %self.state, to = %next, "rejected illegal daemon state transition");
            return;
        }
        info!(from = %self.state, to = %next, "daemon state transition");
        self.state = next;
        changed.notify_all();
    }
}

struct Shared {
    inner: Mutex<Inner>,
    state_changed: Condvar,
    source: Mutex<Box<dyn EventSource>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Only `start` opens, and only while it owns the `Starting` state
    fn open_hook(&self) -> Result<Arc<dyn Hook>, HookError> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open()
    }

    /// Called from the listener thread when the stream breaks unexpectedly
    fn fail_from_listener(&self, hook: &Arc<dyn Hook>, err: StreamError) {
        let mut inner = self.lock();
        if inner.state != DaemonState::Running {
            // stop() got here first and owns the shutdown
            debug!(state = %inner.state, "ignoring stream error during shutdown");
            return;
        }
        hook.close();
        inner.hook = None;
        inner.transition(DaemonState::Failed(err.into()), &self.state_changed);
    }
}

/// Controller for the global hotkey daemon
///
/// `start`, `stop` and `state` take `&self` and may be called from any
/// thread; `stop` in particular is meant to be reachable from a
/// termination-signal handler.
pub struct HotkeyDaemon {
    shared: Arc<Shared>,
    created_at: Instant,
    source_name: &'static str,
}

impl HotkeyDaemon {
    pub fn new(source: Box<dyn EventSource>) -> Self {
        let source_name = source.name();
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: DaemonState::Uninitialized,
                    registration: None,
                    hook: None,
                    listener: None,
                }),
                state_changed: Condvar::new(),
                source: Mutex::new(source),
            }),
            created_at: Instant::now(),
            source_name,
        }
    }

    /// Register the hotkey and its callback. Must precede [`start`].
    ///
    /// The returned [`Dispatcher`] runs `callback` and must be driven by
    /// the consumer loop. Registering again before start replaces the
    /// combination and detaches the earlier dispatcher.
    ///
    /// [`start`]: HotkeyDaemon::start
    pub fn register_hotkey<F>(
        &self,
        combination: HotkeyCombination,
        callback: F,
    ) -> Result<Dispatcher, ConfigError>
    where
        F: FnMut() + 'static,
    {
        let mut inner = self.shared.lock();
        match &inner.state {
            DaemonState::Uninitialized => {}
            state if state.is_terminal() => return Err(ConfigError::Terminal(state.clone())),
            state => return Err(ConfigError::AlreadyStarted(state.clone())),
        }

        if let Some(previous) = &inner.registration {
            debug!(previous = %previous.combination, "replacing registered hotkey");
        }
        let bridge = Arc::new(DispatchBridge::new());
        inner.registration = Some(Registration {
            combination,
            bridge: Arc::clone(&bridge),
        });
        info!(hotkey = %combination, "hotkey registered");

        Ok(Dispatcher::new(bridge, callback))
    }

    /// Install the hook and start the listener thread.
    ///
    /// Hook failures are not errors here: the daemon lands in
    /// [`DaemonState::Failed`], which is returned. Calling `start` on
    /// anything but a fresh daemon reports the current state and does
    /// nothing else; a call racing an in-flight start gets `Starting`.
    pub fn start(&self) -> Result<DaemonState, ConfigError> {
        let registration = {
            let mut inner = self.shared.lock();
            if inner.state != DaemonState::Uninitialized {
                debug!(state = %inner.state, "start ignored");
                return Ok(inner.state.clone());
            }
            let registration = inner
                .registration
                .clone()
                .ok_or(ConfigError::NotRegistered)?;
            inner.transition(DaemonState::Starting, &self.shared.state_changed);
            registration
        };

        // Nothing else leaves Starting, so the state is unchanged on return
        let opened = self.shared.open_hook();
        let mut inner = self.shared.lock();

        let hook = match opened {
            Ok(hook) => hook,
            Err(e) => {
                warn!(
                    error = %e,
                    source = self.source_name,
                    "global hotkey unavailable, continuing without it"
                );
                inner.transition(DaemonState::Failed(e.into()), &self.shared.state_changed);
                return Ok(inner.state.clone());
            }
        };

        let listener_hook = Arc::clone(&hook);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || listen(listener_hook, registration, shared));

        match spawned {
            Ok(handle) => {
                inner.hook = Some(hook);
                inner.listener = Some(handle);
                inner.transition(DaemonState::Running, &self.shared.state_changed);
            }
            Err(e) => {
                error!(error = %e, "failed to spawn hotkey listener thread");
                hook.close();
                inner.transition(
                    DaemonState::Failed(FailureReason::Spawn(e.to_string())),
                    &self.shared.state_changed,
                );
            }
        }

        Ok(inner.state.clone())
    }

    /// Close the hook and join the listener thread.
    ///
    /// Returns once the listener has exited and the hook is released.
    /// A start or stop already in flight is waited out first: a daemon
    /// that was `Starting` is stopped once it reaches `Running`, and a
    /// second caller during `Stopping` returns after that shutdown ends.
    /// Any other state is left alone.
    pub fn stop(&self) -> DaemonState {
        let (hook, listener) = {
            let inner = self.shared.lock();
            let mut inner = self
                .shared
                .state_changed
                .wait_while(inner, |inner| {
                    matches!(inner.state, DaemonState::Starting | DaemonState::Stopping)
                })
                .unwrap_or_else(PoisonError::into_inner);
            if inner.state != DaemonState::Running {
                debug!(state = %inner.state, "stop ignored");
                return inner.state.clone();
            }
            inner.transition(DaemonState::Stopping, &self.shared.state_changed);
            (inner.hook.take(), inner.listener.take())
        };

        if let Some(hook) = &hook {
            hook.close();
        }
        if let Some(handle) = listener {
            if handle.join().is_err() {
                error!("hotkey listener thread panicked");
            }
        }
        drop(hook);

        let mut inner = self.shared.lock();
        inner.transition(DaemonState::Stopped, &self.shared.state_changed);
        inner.state.clone()
    }

    /// Get the current state
    pub fn state(&self) -> DaemonState {
        self.shared.lock().state.clone()
    }

    /// The registered hotkey, if any
    pub fn combination(&self) -> Option<HotkeyCombination> {
        self.shared
            .lock()
            .registration
            .as_ref()
            .map(|r| r.combination)
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl Drop for HotkeyDaemon {
    fn drop(&mut self) {
        self.stop();
        // a listener that failed on its own may still be winding down
        let leftover = self.shared.lock().listener.take();
        if let Some(handle) = leftover {
            let _ = handle.join();
        }
    }
}

/// Listener thread body: read, match, signal until the stream ends
fn listen(hook: Arc<dyn Hook>, registration: Registration, shared: Arc<Shared>) {
    let Registration {
        combination,
        bridge,
    } = registration;
    info!(hotkey = %combination, "hotkey listener thread started");

    loop {
        match hook.read_next() {
            Ok(event) => {
                if matches(&combination, &event) {
                    debug!(hotkey = %combination, "hotkey matched");
                    bridge.signal();
                }
            }
            Err(StreamError::Closed) => {
                debug!("hotkey event stream closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "hotkey event stream failed, disabling hotkey");
                shared.fail_from_listener(&hook, e);
                break;
            }
        }
    }

    info!("hotkey listener thread stopped");
}
