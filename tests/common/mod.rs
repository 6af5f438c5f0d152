#![allow(dead_code)]

use async_trait::async_trait;
use checkout_flow::application::channel::{StateChannel, StateStream};
use checkout_flow::application::observer::ObservableFlow;
use checkout_flow::domain::payment::{
    PaymentResult, PaymentStatus, SecondaryPayload, TermsData, TokenData, WalletAuthorization,
};
use checkout_flow::domain::ports::{FlowInteractor, SecondaryCredentialDelegate, SurfaceHandle};
use checkout_flow::domain::state::{FlowState, FlowStep, PrimaryDetails};
use checkout_flow::error::{FlowError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn john() -> PrimaryDetails {
    PrimaryDetails::new("John", "Doe", "john@x.com")
}

/// Interactor that records every call and can be told to fail or to hold an
/// operation until released.
pub struct MockInteractor {
    details: PrimaryDetails,
    terms: Mutex<TermsData>,
    failures: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    delegate: Mutex<Option<Arc<dyn SecondaryCredentialDelegate>>>,
}

pub struct Collector(pub String);

impl MockInteractor {
    pub fn new(details: PrimaryDetails) -> Self {
        Self {
            details,
            terms: Mutex::new(TermsData {
                full_text: Some("ABC".to_string()),
                template_name: None,
            }),
            failures: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            delegate: Mutex::new(None),
        }
    }

    pub fn set_terms(&self, terms: TermsData) {
        *self.terms.lock().unwrap() = terms;
    }

    pub fn fail(&self, operation: &'static str) {
        self.failures.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failures.lock().unwrap().remove(operation);
    }

    /// Makes `operation` wait until the returned notify fires.
    pub fn gate(&self, operation: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(operation, gate.clone());
        gate
    }

    pub fn gate_persist(&self) -> Arc<Notify> {
        self.gate("persist_primary_details")
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn delegate(&self) -> Option<Arc<dyn SecondaryCredentialDelegate>> {
        self.delegate.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        if self.failures.lock().unwrap().contains(operation) {
            return Err(FlowError::Interactor(format!("{operation} unavailable")));
        }
        Ok(())
    }

    async fn pass_gate(&self, operation: &'static str) {
        let gate = self.gates.lock().unwrap().get(operation).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl FlowInteractor for MockInteractor {
    async fn validate(&self) -> Result<()> {
        self.record("validate")
    }

    async fn load_primary_details(&self) -> Result<PrimaryDetails> {
        self.record("load_primary_details")?;
        Ok(self.details.clone())
    }

    async fn persist_primary_details(&self, _details: &PrimaryDetails) -> Result<()> {
        self.record("persist_primary_details")?;
        self.pass_gate("persist_primary_details").await;
        Ok(())
    }

    async fn start_secondary_credential_process(&self) -> Result<SecondaryPayload> {
        self.record("start_secondary_credential_process")?;
        Ok(SecondaryPayload {
            payment_id: "pay_123".to_string(),
            client_secret: "secret_123".to_string(),
        })
    }

    async fn create_secondary_collector_surface(
        &self,
        _details: &PrimaryDetails,
        client_secret: &str,
        delegate: Arc<dyn SecondaryCredentialDelegate>,
    ) -> Result<SurfaceHandle> {
        self.record("create_secondary_collector_surface")?;
        *self.delegate.lock().unwrap() = Some(delegate);
        Ok(SurfaceHandle::new(Collector(client_secret.to_string())))
    }

    async fn get_terms_data(&self) -> Result<TermsData> {
        self.record("get_terms_data")?;
        Ok(self.terms.lock().unwrap().clone())
    }

    async fn tokenize(&self, authorization: &WalletAuthorization) -> Result<TokenData> {
        self.record("tokenize")?;
        self.pass_gate("tokenize").await;
        Ok(TokenData {
            token: format!("tok_{}", authorization.payment_data),
            payment_method_type: "WALLET".to_string(),
        })
    }

    async fn create_payment(&self, token: &TokenData) -> Result<PaymentResult> {
        self.record("create_payment")?;
        Ok(PaymentResult {
            payment_id: format!("pay_{}", token.token),
            status: PaymentStatus::Success,
            amount: None,
            currency: None,
        })
    }

    async fn complete_payment(&self, payload: &SecondaryPayload) -> Result<PaymentResult> {
        self.record("complete_payment")?;
        Ok(PaymentResult {
            payment_id: payload.payment_id.clone(),
            status: PaymentStatus::Success,
            amount: None,
            currency: None,
        })
    }
}

/// Flow whose states are pushed by the test.
pub struct ScriptedFlow {
    pub channel: StateChannel<FlowState>,
}

impl ScriptedFlow {
    pub fn new() -> Self {
        Self {
            channel: StateChannel::new(FlowState::new()),
        }
    }

    pub fn emit(&self, step: FlowStep, surface_present: bool) {
        self.channel.replace(FlowState {
            step,
            surface_present,
            ..FlowState::new()
        });
    }
}

impl ObservableFlow for ScriptedFlow {
    fn state_stream(&self) -> StateStream<FlowState> {
        self.channel.subscribe()
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
