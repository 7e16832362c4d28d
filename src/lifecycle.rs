//! # Lifecycle Controller
//!
//! Owns the process lifecycle state (`Running → ShuttingDown → Stopped`) and
//! turns termination signals into a shutdown request.
//!
//! Signal delivery only flips an atomic flag and wakes waiters. The consumer
//! is never touched from the signal path: the dispatch worker observes the
//! flag between records and closes the consumer on its own task.
//!
//! ```text
//! SIGINT ─┐
//! SIGTERM ├─> signal task ──> request_shutdown() ──> state = ShuttingDown
//! SIGQUIT │                                              │
//! SIGHUP ─┘                          dispatch worker <───┘ (checks between records)
//!                                          │
//!                                    close consumer ──> mark_stopped() ──> exit 0
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Termination signals that all map to the same graceful shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
    Hangup,
}

impl ShutdownSignal {
    pub const ALL: [ShutdownSignal; 4] = [
        ShutdownSignal::Interrupt,
        ShutdownSignal::Terminate,
        ShutdownSignal::Quit,
        ShutdownSignal::Hangup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Quit => "SIGQUIT",
            ShutdownSignal::Hangup => "SIGHUP",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Quit => SignalKind::quit(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
        }
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What started the shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal was delivered
    Signal(ShutdownSignal),
    /// Application code asked for shutdown
    Requested(String),
    /// The dispatch loop hit an unrecoverable error
    Fatal(String),
}

impl ShutdownTrigger {
    /// Whether this trigger ends the process with a zero status
    pub fn is_graceful(&self) -> bool {
        !matches!(self, ShutdownTrigger::Fatal(_))
    }
}

#[derive(Debug)]
struct LifecycleInner {
    state: AtomicU8,
    trigger: Mutex<Option<ShutdownTrigger>>,
    changed: Notify,
}

/// Cloneable handle to the shared lifecycle state
#[derive(Debug, Clone)]
pub struct LifecycleController {
    inner: Arc<LifecycleInner>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    /// Create a controller in the `Running` state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                state: AtomicU8::new(LifecycleState::Running as u8),
                trigger: Mutex::new(None),
                changed: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state() != LifecycleState::Running
    }

    /// The trigger of the first shutdown request, if any
    pub fn trigger(&self) -> Option<ShutdownTrigger> {
        self.inner.trigger.lock().clone()
    }

    /// Move from `Running` to `ShuttingDown`
    ///
    /// Only the first request wins; later requests return `false` and leave
    /// the recorded trigger untouched.
    pub fn request_shutdown(&self, trigger: ShutdownTrigger) -> bool {
        // Trigger and state change together: a reader that observes
        // `ShuttingDown` and then calls `trigger()` waits on this lock
        let transitioned = {
            let mut recorded = self.inner.trigger.lock();
            let transitioned = self
                .inner
                .state
                .compare_exchange(
                    LifecycleState::Running as u8,
                    LifecycleState::ShuttingDown as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
            if transitioned {
                *recorded = Some(trigger.clone());
            }
            transitioned
        };

        if transitioned {
            info!(trigger = ?trigger, "🛑 Shutdown requested; finishing in-flight record");
            self.inner.changed.notify_waiters();
        } else {
            debug!(trigger = ?trigger, "Shutdown already in progress; ignoring request");
        }
        transitioned
    }

    /// Record a delivered termination signal
    pub fn signal_received(&self, signal: ShutdownSignal) -> bool {
        self.request_shutdown(ShutdownTrigger::Signal(signal))
    }

    /// Final transition, performed by the worker after the consumer is closed
    pub fn mark_stopped(&self) {
        let previous = self
            .inner
            .state
            .swap(LifecycleState::Stopped as u8, Ordering::SeqCst);
        if previous != LifecycleState::Stopped as u8 {
            info!("✅ Lifecycle stopped");
            self.inner.changed.notify_waiters();
        }
    }

    /// Resolve once shutdown has been requested
    pub async fn wait_for_shutdown(&self) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.is_shutdown_requested() {
                return;
            }
            changed.await;
        }
    }

    /// Listen for SIGINT, SIGTERM, SIGQUIT and SIGHUP on a background task
    ///
    /// Must be called from within a tokio runtime. The listener stops when the
    /// returned handle is dropped.
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> std::io::Result<SignalListener> {
        use futures::future::select_all;
        use tokio::signal::unix::signal;

        let mut streams = Vec::with_capacity(ShutdownSignal::ALL.len());
        for shutdown_signal in ShutdownSignal::ALL {
            streams.push((shutdown_signal, signal(shutdown_signal.kind())?));
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let pending = streams.iter_mut().map(|(shutdown_signal, stream)| {
                    Box::pin(async move {
                        stream.recv().await;
                        *shutdown_signal
                    })
                });
                let (received, _, _) = select_all(pending).await;

                if !controller.signal_received(received) {
                    warn!(signal = %received, "Signal received while already shutting down");
                }
            }
        });

        info!("Registered shutdown handlers for SIGINT, SIGTERM, SIGQUIT, SIGHUP");
        Ok(SignalListener { handle })
    }

    /// Listen for Ctrl-C on a background task
    #[cfg(not(unix))]
    pub fn install_signal_handlers(&self) -> std::io::Result<SignalListener> {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                controller.signal_received(ShutdownSignal::Interrupt);
            }
        });

        info!("Registered shutdown handler for Ctrl-C");
        Ok(SignalListener { handle })
    }
}

/// Background signal listener; aborted on drop
#[derive(Debug)]
pub struct SignalListener {
    handle: JoinHandle<()>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_controller_starts_running() {
        let lifecycle = LifecycleController::new();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert!(lifecycle.is_running());
        assert!(lifecycle.trigger().is_none());
    }

    #[test]
    fn test_first_shutdown_request_wins() {
        let lifecycle = LifecycleController::new();

        assert!(lifecycle.signal_received(ShutdownSignal::Terminate));
        assert!(!lifecycle.signal_received(ShutdownSignal::Interrupt));
        assert!(!lifecycle.request_shutdown(ShutdownTrigger::Requested("again".to_string())));

        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
        assert_eq!(
            lifecycle.trigger(),
            Some(ShutdownTrigger::Signal(ShutdownSignal::Terminate))
        );
    }

    #[test]
    fn test_every_signal_maps_to_graceful_shutdown() {
        for shutdown_signal in ShutdownSignal::ALL {
            let lifecycle = LifecycleController::new();
            assert!(lifecycle.signal_received(shutdown_signal));
            assert!(lifecycle.is_shutdown_requested());
            assert!(lifecycle.trigger().unwrap().is_graceful());
        }
    }

    #[test]
    fn test_trigger_is_visible_once_shutting_down() {
        for _ in 0..200 {
            let lifecycle = LifecycleController::new();
            let observer = lifecycle.clone();
            let reader = std::thread::spawn(move || loop {
                if observer.is_shutdown_requested() {
                    return observer.trigger();
                }
                std::hint::spin_loop();
            });

            lifecycle.signal_received(ShutdownSignal::Terminate);
            assert_eq!(
                reader.join().unwrap(),
                Some(ShutdownTrigger::Signal(ShutdownSignal::Terminate))
            );
        }
    }

    #[test]
    fn test_mark_stopped_is_terminal() {
        let lifecycle = LifecycleController::new();
        lifecycle.request_shutdown(ShutdownTrigger::Requested("test".to_string()));
        lifecycle.mark_stopped();
        lifecycle.mark_stopped();

        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!lifecycle.request_shutdown(ShutdownTrigger::Requested("late".to_string())));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_wakes_waiters() {
        let lifecycle = LifecycleController::new();
        let waiter = lifecycle.clone();
        let waiting = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        lifecycle.signal_received(ShutdownSignal::Hangup);

        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_install_signal_handlers() {
        let lifecycle = LifecycleController::new();
        let listener = lifecycle.install_signal_handlers().unwrap();
        assert!(lifecycle.is_running());
        drop(listener);
    }
}
