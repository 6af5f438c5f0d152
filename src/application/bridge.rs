//! One-shot adapter from delegate-callback vendor APIs to a single awaited
//! result.

use super::channel::lock;
use crate::error::ExternalSurfaceError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Outcome<T> = Result<T, ExternalSurfaceError>;

/// A vendor component that reports exactly one outcome through callbacks.
pub trait ExternalSurface: Send + Sync {
    type Request: Send;
    type Output: Send + 'static;

    /// Starts presenting the surface. The outcome must be delivered later
    /// (or synchronously) through `callbacks`.
    fn present(
        &self,
        request: Self::Request,
        callbacks: BridgeCallbacks<Self::Output>,
    ) -> Result<(), ExternalSurfaceError>;

    /// Best-effort teardown, used on local timeout or when the caller stops
    /// waiting.
    fn dismiss(&self) {}
}

struct PendingSlot<T> {
    completion: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

impl<T> PendingSlot<T> {
    fn take(&self) -> Option<oneshot::Sender<Outcome<T>>> {
        lock(&self.completion).take()
    }

    fn is_pending(&self) -> bool {
        lock(&self.completion).is_some()
    }

    fn is_abandoned(&self) -> bool {
        lock(&self.completion)
            .as_ref()
            .is_some_and(|tx| tx.is_closed())
    }
}

/// Callback side handed to the vendor. Cheap to clone; every clone resolves
/// the same pending completion, and only the first resolution counts.
pub struct BridgeCallbacks<T> {
    slot: Arc<PendingSlot<T>>,
}

impl<T> Clone for BridgeCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> BridgeCallbacks<T> {
    pub fn succeeded(&self, payload: T) -> bool {
        self.resolve(Ok(payload))
    }

    pub fn cancelled(&self) -> bool {
        self.resolve(Err(ExternalSurfaceError::Cancelled))
    }

    pub fn timed_out(&self) -> bool {
        self.resolve(Err(ExternalSurfaceError::TimedOut))
    }

    pub fn protocol_error(&self, detail: impl Into<String>) -> bool {
        self.resolve(Err(ExternalSurfaceError::ProtocolError(detail.into())))
    }

    pub fn runtime_error(&self, code: impl Into<String>, detail: impl Into<String>) -> bool {
        self.resolve(Err(ExternalSurfaceError::RuntimeError {
            code: code.into(),
            detail: detail.into(),
        }))
    }

    pub fn failed(&self, error: ExternalSurfaceError) -> bool {
        self.resolve(Err(error))
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_pending()
    }

    /// Returns `true` only for the callback that resolved the completion.
    fn resolve(&self, outcome: Outcome<T>) -> bool {
        let Some(completion) = self.slot.take() else {
            debug!("external callback after resolution ignored");
            return false;
        };
        if completion.send(outcome).is_err() {
            debug!("caller stopped waiting; external result discarded");
        }
        true
    }
}

/// Disarmed once the invocation finishes; dismisses the surface if the
/// awaiting future is dropped first.
struct DismissOnDrop<'a, S: ExternalSurface + ?Sized> {
    surface: &'a S,
    armed: bool,
}

impl<S: ExternalSurface + ?Sized> Drop for DismissOnDrop<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            debug!("caller cancelled while external surface pending; dismissing");
            self.surface.dismiss();
        }
    }
}

/// Converts one presentation of an [`ExternalSurface`] into a single
/// `Result`, optionally bounded by a local timeout.
pub struct ExternalCallbackBridge<T> {
    current: Mutex<Option<Arc<PendingSlot<T>>>>,
    timeout: Option<Duration>,
}

impl<T: Send + 'static> Default for ExternalCallbackBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> ExternalCallbackBridge<T> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            timeout: None,
        }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            current: Mutex::new(None),
            timeout,
        }
    }

    /// True while a presentation has not been resolved yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|slot| slot.is_pending())
    }

    /// Resolves the pending presentation as cancelled, so a late vendor
    /// callback is discarded. Returns `false` when nothing was pending.
    pub fn cancel_pending(&self) -> bool {
        let slot = lock(&self.current).clone();
        let Some(completion) = slot.and_then(|slot| slot.take()) else {
            return false;
        };
        if completion.send(Err(ExternalSurfaceError::Cancelled)).is_err() {
            debug!("caller stopped waiting before cancellation");
        }
        true
    }

    /// Presents `surface` and waits until exactly one of its callbacks (or the
    /// local timeout) resolves the result.
    pub async fn invoke<S>(&self, surface: &S, request: S::Request) -> Outcome<T>
    where
        S: ExternalSurface<Output = T> + ?Sized,
    {
        let (tx, mut rx) = oneshot::channel();
        let slot = Arc::new(PendingSlot {
            completion: Mutex::new(Some(tx)),
        });

        {
            let mut current = lock(&self.current);
            if let Some(previous) = current.as_ref()
                && previous.is_pending()
            {
                if previous.is_abandoned() {
                    debug!("replacing abandoned external presentation");
                    previous.take();
                } else {
                    return Err(ExternalSurfaceError::PresentationFailed(
                        "another external surface is still pending".to_string(),
                    ));
                }
            }
            *current = Some(Arc::clone(&slot));
        }

        let callbacks = BridgeCallbacks {
            slot: Arc::clone(&slot),
        };
        let mut guard = DismissOnDrop {
            surface,
            armed: true,
        };

        if let Err(err) = surface.present(request, callbacks)
            && slot.take().is_some()
        {
            guard.armed = false;
            warn!(error = %err, "external surface failed to present");
            return Err(match err {
                ExternalSurfaceError::PresentationFailed(_) => err,
                other => ExternalSurfaceError::PresentationFailed(other.to_string()),
            });
        }

        let received = match self.timeout {
            None => (&mut rx).await,
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received,
                Err(_) => {
                    if slot.take().is_some() {
                        guard.armed = false;
                        warn!(?limit, "external surface timed out");
                        surface.dismiss();
                        return Err(ExternalSurfaceError::TimedOut);
                    }
                    // A vendor callback won the race and is delivering now.
                    (&mut rx).await
                }
            },
        };
        guard.armed = false;

        received.unwrap_or(Err(ExternalSurfaceError::Cancelled))
    }
}
