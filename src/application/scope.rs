use super::channel::{StateChannel, StateStream, lock};
use super::observer::ObservableFlow;
use crate::domain::payment::SecondaryPayload;
use crate::domain::ports::{
    HostArc, InteractorArc, SecondaryCredentialDelegate, SurfaceHandle, ValidatorArc,
};
use crate::domain::state::{Field, FlowState, FlowStep, PresentationContext, PrimaryDetails};
use crate::domain::validation::DefaultFieldValidator;
use crate::error::{ExternalSurfaceError, FlowError, Result};
use crate::interfaces::render::FlowCustomization;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Owner of one bank-debit flow.
///
/// Every mutation happens under a single lock that is never held across an
/// `.await`, so state changes are serialized and each emission on
/// [`FlowStateMachine::state`] follows the mutation that produced it. Cloning
/// yields another handle to the same flow.
#[derive(Clone)]
pub struct FlowStateMachine {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    interactor: InteractorArc,
    host: HostArc,
    validator: ValidatorArc,
    presentation_context: PresentationContext,
    core: Mutex<ScopeCore>,
    channel: StateChannel<FlowState>,
    customization: Mutex<FlowCustomization>,
    delegate_tx: mpsc::UnboundedSender<DelegateEvent>,
    delegate_rx: Mutex<Option<mpsc::UnboundedReceiver<DelegateEvent>>>,
    pump: Mutex<Option<AbortHandle>>,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.pump).take() {
            debug!("flow dropped; stopping delegate pump");
            pump.abort();
        }
    }
}

#[derive(Default)]
struct ScopeCore {
    state: FlowState,
    payload: Option<SecondaryPayload>,
    surface: Option<SurfaceHandle>,
    start_in_flight: bool,
    submit_in_flight: bool,
    terms_in_flight: bool,
    payment_in_flight: bool,
}

#[derive(Debug)]
enum DelegateEvent {
    Succeeded(String),
    Cancelled,
    Failed(ExternalSurfaceError),
}

impl FlowStateMachine {
    pub fn new(
        interactor: InteractorArc,
        host: HostArc,
        presentation_context: PresentationContext,
    ) -> Self {
        Self::with_validator(
            interactor,
            host,
            Arc::new(DefaultFieldValidator),
            presentation_context,
        )
    }

    pub fn with_validator(
        interactor: InteractorArc,
        host: HostArc,
        validator: ValidatorArc,
        presentation_context: PresentationContext,
    ) -> Self {
        let (delegate_tx, delegate_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ScopeInner {
                interactor,
                host,
                validator,
                presentation_context,
                core: Mutex::new(ScopeCore::default()),
                channel: StateChannel::new(FlowState::new()),
                customization: Mutex::new(FlowCustomization::default()),
                delegate_tx,
                delegate_rx: Mutex::new(Some(delegate_rx)),
                pump: Mutex::new(None),
            }),
        }
    }

    /// Stream of states: the current one first, then every change.
    pub fn state(&self) -> StateStream<FlowState> {
        self.inner.channel.subscribe()
    }

    pub fn current_state(&self) -> FlowState {
        lock(&self.inner.core).state.clone()
    }

    pub fn presentation_context(&self) -> PresentationContext {
        self.inner.presentation_context
    }

    /// The secondary-credential surface, present only while
    /// `SecondaryCredentialCollection` needs it.
    pub fn surface_handle(&self) -> Option<SurfaceHandle> {
        lock(&self.inner.core).surface.clone()
    }

    pub fn customization(&self) -> FlowCustomization {
        lock(&self.inner.customization).clone()
    }

    pub fn set_customization(&self, customization: FlowCustomization) {
        *lock(&self.inner.customization) = customization;
    }

    /// Delegate to hand to an external secondary-credential surface. Its
    /// callbacks may fire from any thread; they are queued and replayed here
    /// one at a time.
    pub fn delegate(&self) -> Arc<dyn SecondaryCredentialDelegate> {
        self.ensure_delegate_pump();
        Arc::new(ScopeDelegate {
            events: self.inner.delegate_tx.clone(),
        })
    }

    /// Validates preconditions and loads the primary details. Safe to call
    /// again after a failure; a no-op once the flow has left `Loading`.
    pub async fn start(&self) {
        self.ensure_delegate_pump();
        {
            let mut core = lock(&self.inner.core);
            if core.start_in_flight || core.state.step != FlowStep::Loading {
                debug!(step = %core.state.step, "start ignored");
                return;
            }
            core.start_in_flight = true;
        }
        debug!("flow started");

        let loaded = self.load_primary_details().await;

        let failure = {
            let mut core = lock(&self.inner.core);
            core.start_in_flight = false;
            match loaded {
                Ok(primary) => {
                    let next = FlowState {
                        step: FlowStep::PrimaryDetailsCollection,
                        primary,
                        ..core.state.clone()
                    };
                    self.commit(&mut core, next);
                    info!("primary details loaded");
                    None
                }
                Err(err) => Some(err),
            }
        };

        if let Some(err) = failure {
            self.report(err, "primary details loading");
        }
    }

    async fn load_primary_details(&self) -> Result<PrimaryDetails> {
        self.inner.interactor.validate().await?;
        self.inner.interactor.load_primary_details().await
    }

    /// Local edit of one field. Never calls the interactor.
    pub fn update_field(&self, field: Field, value: impl Into<String>) {
        let mut core = lock(&self.inner.core);
        let mut next = core.state.clone();
        next.primary.set(field, value.into());
        self.commit(&mut core, next);
    }

    /// Persists the details and opens the secondary-credential surface.
    /// A no-op while submit is disabled or a submission is already in flight.
    pub async fn submit_primary_details(&self) {
        self.ensure_delegate_pump();
        let details = {
            let mut core = lock(&self.inner.core);
            if core.submit_in_flight
                || core.state.step != FlowStep::PrimaryDetailsCollection
                || !core.state.is_submit_enabled
            {
                warn!(step = %core.state.step, "cannot submit primary details");
                return;
            }
            core.submit_in_flight = true;
            let next = FlowState {
                is_loading: true,
                ..core.state.clone()
            };
            self.commit(&mut core, next);
            core.state.primary.clone()
        };
        debug!("submitting primary details");

        let delegate = self.delegate();
        let created = self.open_secondary_surface(&details, delegate).await;

        let failure = {
            let mut core = lock(&self.inner.core);
            core.submit_in_flight = false;
            match created {
                Ok((payload, handle)) => {
                    core.payload = Some(payload);
                    core.surface = Some(handle);
                    let next = FlowState {
                        step: FlowStep::SecondaryCredentialCollection,
                        is_loading: false,
                        ..core.state.clone()
                    };
                    self.commit(&mut core, next);
                    info!("secondary credential surface created");
                    None
                }
                Err(err) => {
                    let next = FlowState {
                        is_loading: false,
                        ..core.state.clone()
                    };
                    self.commit(&mut core, next);
                    Some(err)
                }
            }
        };

        if let Some(err) = failure {
            self.report(err, "secondary credential setup");
        }
    }

    async fn open_secondary_surface(
        &self,
        details: &PrimaryDetails,
        delegate: Arc<dyn SecondaryCredentialDelegate>,
    ) -> Result<(SecondaryPayload, SurfaceHandle)> {
        let interactor = &self.inner.interactor;
        interactor.persist_primary_details(details).await?;
        let payload = interactor.start_secondary_credential_process().await?;
        let handle = interactor
            .create_secondary_collector_surface(details, &payload.client_secret, delegate)
            .await?;
        Ok((payload, handle))
    }

    /// The external surface collected the credential. Loads the terms and
    /// moves to `TermsAcceptance`.
    pub async fn on_secondary_credential_succeeded(&self, identifier: String) {
        {
            let mut core = lock(&self.inner.core);
            core.surface = None;
            if core.state.step != FlowStep::SecondaryCredentialCollection || core.terms_in_flight
            {
                debug!(step = %core.state.step, %identifier, "secondary success ignored");
                let next = core.state.clone();
                self.commit(&mut core, next);
                return;
            }
            core.terms_in_flight = true;
            let next = FlowState {
                is_loading: true,
                ..core.state.clone()
            };
            self.commit(&mut core, next);
        }
        debug!(%identifier, "secondary credential collected");

        let terms = self.inner.interactor.get_terms_data().await;

        let failure = {
            let mut core = lock(&self.inner.core);
            core.terms_in_flight = false;
            match terms {
                Ok(terms) => {
                    let next = FlowState {
                        step: FlowStep::TermsAcceptance,
                        terms_text: Some(terms.into_text()),
                        is_loading: false,
                        ..core.state.clone()
                    };
                    self.commit(&mut core, next);
                    info!("moved to terms acceptance");
                    None
                }
                Err(err) => {
                    let next = FlowState {
                        is_loading: false,
                        ..core.state.clone()
                    };
                    self.commit(&mut core, next);
                    Some(err)
                }
            }
        };

        if let Some(err) = failure {
            self.report(err, "terms loading");
        }
    }

    pub async fn on_secondary_credential_cancelled(&self) {
        self.retreat_from_secondary(ExternalSurfaceError::Cancelled);
    }

    pub async fn on_secondary_credential_failed(&self, error: ExternalSurfaceError) {
        self.retreat_from_secondary(error);
    }

    fn retreat_from_secondary(&self, error: ExternalSurfaceError) {
        let retreated = {
            let mut core = lock(&self.inner.core);
            core.surface = None;
            if core.state.step == FlowStep::SecondaryCredentialCollection && !core.terms_in_flight {
                core.payload = None;
                let next = FlowState {
                    step: FlowStep::PrimaryDetailsCollection,
                    is_loading: false,
                    ..core.state.clone()
                };
                self.commit(&mut core, next);
                true
            } else {
                let next = core.state.clone();
                self.commit(&mut core, next);
                false
            }
        };

        if retreated {
            info!(error = %error, "secondary credential surface closed, back to primary details");
            self.inner.host.report_error(&FlowError::ExternalSurface(error));
        } else {
            debug!(error = %error, "late secondary surface callback ignored");
        }
    }

    /// Accepts the terms and completes the payment. The outcome goes to the
    /// host; the flow itself stays at `Processing`.
    pub async fn accept_terms(&self) {
        let payload = {
            let mut core = lock(&self.inner.core);
            if core.state.step != FlowStep::TermsAcceptance || core.payment_in_flight {
                warn!(step = %core.state.step, "cannot accept terms in current step");
                return;
            }
            core.payment_in_flight = true;
            let next = FlowState {
                step: FlowStep::Processing,
                ..core.state.clone()
            };
            self.commit(&mut core, next);
            core.payload.clone()
        };
        debug!("terms accepted");

        let completed = match payload {
            Some(payload) => self.inner.interactor.complete_payment(&payload).await,
            None => Err(FlowError::MissingPayload(
                "secondary credential payload not available for payment completion",
            )),
        };
        lock(&self.inner.core).payment_in_flight = false;

        match completed {
            Ok(result) => {
                info!(payment_id = %result.payment_id, "payment completed");
                self.inner.host.payment_succeeded(result);
            }
            Err(err) => self.report(err, "payment completion"),
        }
    }

    pub fn decline_terms(&self) {
        debug!("terms declined");
        self.inner
            .host
            .report_error(&FlowError::ExternalSurface(ExternalSurfaceError::Cancelled));
    }

    pub fn cancel(&self) {
        {
            let mut core = lock(&self.inner.core);
            if core.state.is_loading {
                let next = FlowState {
                    is_loading: false,
                    ..core.state.clone()
                };
                self.commit(&mut core, next);
            }
        }
        debug!(context = ?self.inner.presentation_context, "flow cancelled");
        match self.inner.presentation_context {
            PresentationContext::FromSelection => self.inner.host.navigate_back(),
            PresentationContext::Direct => self.inner.host.dismiss(),
        }
    }

    pub fn on_back(&self) {
        if self.inner.presentation_context.should_show_back_button() {
            self.inner.host.navigate_back();
        }
    }

    fn commit(&self, core: &mut ScopeCore, mut next: FlowState) {
        next.surface_present = core.surface.is_some();
        let next = next.revalidated(self.inner.validator.as_ref());
        if next == core.state {
            return;
        }
        debug!(step = %next.step, submit = next.is_submit_enabled, loading = next.is_loading, "state changed");
        core.state = next.clone();
        self.inner.channel.replace(next);
    }

    fn report(&self, err: FlowError, context: &str) {
        error!(error = %err, "{context} failed");
        self.inner.host.report_error(&err);
    }

    fn ensure_delegate_pump(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(mut events) = lock(&self.inner.delegate_rx).take() else {
            return;
        };
        let scope = Arc::downgrade(&self.inner);
        let pump = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = Weak::upgrade(&scope) else {
                    debug!(?event, "flow gone; delegate event dropped");
                    break;
                };
                let machine = FlowStateMachine { inner };
                match event {
                    DelegateEvent::Succeeded(id) => {
                        machine.on_secondary_credential_succeeded(id).await
                    }
                    DelegateEvent::Cancelled => machine.on_secondary_credential_cancelled().await,
                    DelegateEvent::Failed(err) => {
                        machine.on_secondary_credential_failed(err).await
                    }
                }
            }
        });
        *lock(&self.inner.pump) = Some(pump.abort_handle());
    }
}

impl ObservableFlow for FlowStateMachine {
    fn state_stream(&self) -> StateStream<FlowState> {
        self.state()
    }
}

struct ScopeDelegate {
    events: mpsc::UnboundedSender<DelegateEvent>,
}

impl ScopeDelegate {
    fn send(&self, event: DelegateEvent) {
        if let Err(rejected) = self.events.send(event) {
            debug!(event = ?rejected.0, "flow gone; delegate callback dropped");
        }
    }
}

impl SecondaryCredentialDelegate for ScopeDelegate {
    fn on_succeeded(&self, identifier: String) {
        self.send(DelegateEvent::Succeeded(identifier));
    }

    fn on_cancelled(&self) {
        self.send(DelegateEvent::Cancelled);
    }

    fn on_failed(&self, error: ExternalSurfaceError) {
        self.send(DelegateEvent::Failed(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::infrastructure::in_memory::{HostEvent, RecordingHost, SandboxInteractor};

    fn scope_with(config: SandboxConfig) -> (FlowStateMachine, Arc<RecordingHost>) {
        let (scope, _, host) = sandbox_scope(config);
        (scope, host)
    }

    fn sandbox_scope(
        config: SandboxConfig,
    ) -> (FlowStateMachine, Arc<SandboxInteractor>, Arc<RecordingHost>) {
        let interactor = Arc::new(SandboxInteractor::new(config));
        let host = Arc::new(RecordingHost::new());
        let scope = FlowStateMachine::new(
            interactor.clone(),
            host.clone(),
            PresentationContext::FromSelection,
        );
        (scope, interactor, host)
    }

    #[tokio::test]
    async fn test_new_scope_starts_loading() {
        let (scope, _) = scope_with(SandboxConfig::default());
        assert_eq!(scope.current_state(), FlowState::new());
        assert!(scope.surface_handle().is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_after_success() {
        let (scope, host) = scope_with(SandboxConfig::default());
        scope.start().await;
        scope.update_field(Field::FirstName, "Jane");
        scope.start().await;

        let state = scope.current_state();
        assert_eq!(state.step, FlowStep::PrimaryDetailsCollection);
        assert_eq!(state.primary.first_name, "Jane");
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn test_retreat_outside_secondary_step_is_silent() {
        let (scope, host) = scope_with(SandboxConfig::default());
        scope.start().await;
        scope.on_secondary_credential_cancelled().await;

        assert_eq!(scope.current_state().step, FlowStep::PrimaryDetailsCollection);
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn test_collector_delegate_is_replayed_on_scope() {
        let (scope, interactor, host) = sandbox_scope(SandboxConfig::default());
        scope.start().await;
        scope.update_field(Field::LastName, "Roe");
        scope.submit_primary_details().await;
        assert_eq!(
            interactor.persisted_details().await.map(|d| d.last_name),
            Some("Roe".to_string())
        );

        let mut states = scope.state();
        interactor
            .last_delegate()
            .await
            .expect("collector delegate")
            .on_succeeded("bank_1".to_string());
        while let Some(state) = states.next().await {
            if state.step == FlowStep::TermsAcceptance {
                assert!(state.terms_text.unwrap().contains("Example Merchant"));
                break;
            }
        }
        assert!(scope.surface_handle().is_none());
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn test_decline_reports_cancellation() {
        let (scope, host) = scope_with(SandboxConfig::default());
        scope.decline_terms();
        assert_eq!(
            host.events(),
            vec![HostEvent::Error("external surface was cancelled".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dropping_scope_stops_delegate_pump() {
        let (scope, interactor, _) = sandbox_scope(SandboxConfig::default());
        scope.start().await;
        scope.submit_primary_details().await;
        let delegate = interactor.last_delegate().await.expect("collector delegate");
        let events = scope.inner.delegate_tx.clone();
        assert!(!events.is_closed());

        drop(scope);

        for _ in 0..400 {
            if events.is_closed() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(events.is_closed());
        delegate.on_succeeded("bank_1".to_string());
    }
}
