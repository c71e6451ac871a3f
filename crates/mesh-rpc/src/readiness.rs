// crates/mesh-rpc/src/readiness.rs
//
// ReadinessSignal: write-once cell through which a worker reports the
// outcome of its startup to whoever launched it.
//
// Waiters may block (`wait`) from plain threads or await (`wait_async`)
// from inside a runtime. Every waiter sees the same outcome.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use mesh_core::MeshError;
use tokio::sync::Notify;
use tracing::error;

struct Inner<T> {
    slot: Mutex<Option<Result<T, MeshError>>>,
    cond: Condvar,
    notify: Notify,
}

/// Single-assignment readiness cell holding either a value or the captured
/// startup error.
pub struct ReadinessSignal<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReadinessSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ReadinessSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessSignal")
            .field("set", &self.lock().is_some())
            .finish()
    }
}

impl<T: Clone> Default for ReadinessSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ReadinessSignal<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                cond: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Report successful startup.
    pub fn set(&self, value: T) -> Result<(), MeshError> {
        self.assign(Ok(value))
    }

    /// Report failed startup.
    pub fn set_error(&self, err: MeshError) -> Result<(), MeshError> {
        self.assign(Err(err))
    }

    /// Whether an outcome has been assigned.
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// The outcome, if already assigned. Never blocks.
    pub fn try_get(&self) -> Option<Result<T, MeshError>> {
        self.lock().clone()
    }

    /// Block the current thread until the outcome is assigned or `timeout`
    /// elapses. `None` waits forever.
    ///
    /// Must not be called from a runtime thread that the worker depends on.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<T, MeshError> {
        let guard = self.lock();
        let guard = match timeout {
            Some(limit) => {
                let (guard, _) = self
                    .inner
                    .cond
                    .wait_timeout_while(guard, limit, |slot| slot.is_none())
                    .unwrap_or_else(|e| e.into_inner());
                guard
            }
            None => self
                .inner
                .cond
                .wait_while(guard, |slot| slot.is_none())
                .unwrap_or_else(|e| e.into_inner()),
        };

        match guard.as_ref() {
            Some(outcome) => outcome.clone(),
            None => Err(timed_out(timeout)),
        }
    }

    /// Await the outcome without blocking the runtime.
    pub async fn wait_async(&self, timeout: Option<Duration>) -> Result<T, MeshError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait_forever())
                .await
                .map_err(|_| timed_out(timeout))?,
            None => self.wait_forever().await,
        }
    }

    async fn wait_forever(&self) -> Result<T, MeshError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the slot so a concurrent assign is not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.try_get() {
                return outcome;
            }
            notified.await;
        }
    }

    fn assign(&self, outcome: Result<T, MeshError>) -> Result<(), MeshError> {
        let mut slot = self.lock();
        if slot.is_some() {
            error!("Readiness signal assigned twice; keeping the first outcome");
            return Err(MeshError::InvalidState(
                "Readiness signal already assigned".to_string(),
            ));
        }
        *slot = Some(outcome);
        drop(slot);

        self.inner.cond.notify_all();
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

impl<T> ReadinessSignal<T> {
    fn lock(&self) -> MutexGuard<'_, Option<Result<T, MeshError>>> {
        self.inner.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn timed_out(timeout: Option<Duration>) -> MeshError {
    MeshError::Timeout(format!("not ready after {:?}", timeout.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_wait_sees_value_from_other_thread() {
        let signal: ReadinessSignal<u32> = ReadinessSignal::new();
        let setter = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set(7).unwrap();
        });
        assert_eq!(signal.wait(Some(Duration::from_secs(5))).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn debug_does_not_require_clone() {
        struct Opaque;
        let signal: ReadinessSignal<Opaque> = ReadinessSignal {
            inner: Arc::new(Inner {
                slot: Mutex::new(Some(Ok(Opaque))),
                cond: Condvar::new(),
                notify: Notify::new(),
            }),
        };
        assert_eq!(format!("{:?}", signal), "ReadinessSignal { set: true }");

        let unset: ReadinessSignal<u32> = ReadinessSignal::new();
        assert_eq!(format!("{:?}", unset), "ReadinessSignal { set: false }");
    }

    #[test]
    fn second_assignment_is_rejected() {
        let signal: ReadinessSignal<u32> = ReadinessSignal::new();
        signal.set(1).unwrap();
        let err = signal.set_error(MeshError::Startup("late".to_string())).unwrap_err();
        assert!(matches!(err, MeshError::InvalidState(_)));
        assert_eq!(signal.try_get(), Some(Ok(1)));
    }

    #[test]
    fn error_is_delivered_to_every_waiter() {
        let signal: ReadinessSignal<u32> = ReadinessSignal::new();
        signal
            .set_error(MeshError::Startup("join failed".to_string()))
            .unwrap();
        for _ in 0..3 {
            assert_eq!(
                signal.wait(None).unwrap_err(),
                MeshError::Startup("join failed".to_string())
            );
        }
    }

    #[test]
    fn blocking_wait_times_out() {
        let signal: ReadinessSignal<u32> = ReadinessSignal::new();
        let err = signal.wait(Some(Duration::from_millis(10))).unwrap_err();
        assert!(matches!(err, MeshError::Timeout(_)));
    }

    #[tokio::test]
    async fn async_wait_wakes_on_assignment() {
        let signal: ReadinessSignal<&'static str> = ReadinessSignal::new();
        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            setter.set("ready").unwrap();
        });
        assert_eq!(
            signal.wait_async(Some(Duration::from_secs(5))).await.unwrap(),
            "ready"
        );
    }

    #[tokio::test]
    async fn async_wait_times_out() {
        let signal: ReadinessSignal<u32> = ReadinessSignal::new();
        let err = signal
            .wait_async(Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Timeout(_)));
    }
}
