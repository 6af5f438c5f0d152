use super::channel::{StateStream, lock};
use crate::domain::state::{FlowState, FlowStep};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Anything that exposes an ordered stream of [`FlowState`] values.
pub trait ObservableFlow: Send + Sync {
    fn state_stream(&self) -> StateStream<FlowState>;
}

/// Presentation-only signal derived from the flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSignal {
    pub show_surface: bool,
    /// Latched once the flow reaches `TermsAcceptance`; never resets.
    pub surface_exhausted: bool,
}

/// Folds one observed state into the signal.
///
/// The surface is shown while the flow collects the secondary credential and
/// still owns a surface. `Processing` keeps whatever was shown; every other
/// step hides it. Once terms were reached the surface is never shown again.
pub fn reduce(signal: SurfaceSignal, step: FlowStep, surface_present: bool) -> SurfaceSignal {
    let surface_exhausted = signal.surface_exhausted || step == FlowStep::TermsAcceptance;
    let show_surface = match step {
        FlowStep::SecondaryCredentialCollection => surface_present && !surface_exhausted,
        FlowStep::Processing => signal.show_surface,
        FlowStep::Loading | FlowStep::PrimaryDetailsCollection | FlowStep::TermsAcceptance => {
            false
        }
    };
    SurfaceSignal {
        show_surface,
        surface_exhausted,
    }
}

/// Subscribes to a flow and keeps a [`SurfaceSignal`] up to date.
///
/// Start, stop and restart are idempotent. Stopping, or dropping the
/// observer, cancels the subscription; values still in flight are ignored.
pub struct PresentationSignalObserver {
    source: Arc<dyn ObservableFlow>,
    shared: Arc<Mutex<Shared>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    generation: u64,
    state: Option<FlowState>,
    signal: SurfaceSignal,
    show_tx: watch::Sender<bool>,
}

impl PresentationSignalObserver {
    pub fn new(source: Arc<dyn ObservableFlow>) -> Self {
        let (show_tx, _) = watch::channel(false);
        Self {
            source,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                state: None,
                signal: SurfaceSignal::default(),
                show_tx,
            })),
            task: Mutex::new(None),
        }
    }

    /// Begins observing. No-op while already observing.
    pub fn start_observing(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("already observing");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available; observation not started");
            return;
        };

        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.generation
        };
        let mut stream = self.source.state_stream();
        let shared = Arc::clone(&self.shared);
        *task = Some(runtime.spawn(async move {
            while let Some(state) = stream.next().await {
                let mut shared = lock(&shared);
                if shared.generation != generation {
                    break;
                }
                let next = reduce(shared.signal, state.step, state.surface_present);
                if next != shared.signal {
                    debug!(step = %state.step, show = next.show_surface, exhausted = next.surface_exhausted, "surface signal changed");
                }
                shared.signal = next;
                shared.show_tx.send_replace(next.show_surface);
                shared.state = Some(state);
            }
        }));
        debug!(generation, "observation started");
    }

    /// Stops observing. Safe to call at any time, any number of times.
    pub fn stop_observing(&self) {
        lock(&self.shared).generation += 1;
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            debug!("observation stopped");
        }
    }

    pub fn is_observing(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn show_surface(&self) -> bool {
        lock(&self.shared).signal.show_surface
    }

    pub fn signal(&self) -> SurfaceSignal {
        lock(&self.shared).signal
    }

    /// Last state seen while observing.
    pub fn flow_state(&self) -> Option<FlowState> {
        lock(&self.shared).state.clone()
    }

    /// Receiver that is notified whenever `show_surface` is recomputed.
    pub fn signal_updates(&self) -> watch::Receiver<bool> {
        lock(&self.shared).show_tx.subscribe()
    }
}

impl Drop for PresentationSignalObserver {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}
