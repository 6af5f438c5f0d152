use crate::application::bridge::{BridgeCallbacks, ExternalSurface};
use crate::application::channel::lock;
use crate::application::wallet::WalletSheet;
use crate::config::SandboxConfig;
use crate::domain::payment::{
    Amount, PaymentResult, PaymentStatus, SecondaryPayload, TermsData, TokenData,
    WalletAuthorization, WalletRequest,
};
use crate::domain::ports::{
    CheckoutHost, FlowInteractor, PaymentMethodDescriptor, PaymentMethodKind,
    PaymentMethodRegistry, SecondaryCredentialDelegate, SurfaceHandle,
};
use crate::domain::state::PrimaryDetails;
use crate::error::{ExternalSurfaceError, FlowError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

/// Interactor backed by a [`SandboxConfig`] instead of a payment backend.
///
/// Counts every call per operation and fails the operation named by
/// `fail_operation`. The delegate handed to the collector surface is kept so
/// callers can drive it.
#[derive(Default)]
pub struct SandboxInteractor {
    config: SandboxConfig,
    calls: RwLock<HashMap<&'static str, usize>>,
    persisted: RwLock<Option<PrimaryDetails>>,
    delegate: RwLock<Option<Arc<dyn SecondaryCredentialDelegate>>>,
}

/// Stand-in for the vendor's bank collector UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCollector {
    pub client_secret: String,
    pub email_address: String,
}

impl SandboxInteractor {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls.read().await.get(operation).copied().unwrap_or(0)
    }

    pub async fn persisted_details(&self) -> Option<PrimaryDetails> {
        self.persisted.read().await.clone()
    }

    /// Delegate passed to the most recently created collector surface.
    pub async fn last_delegate(&self) -> Option<Arc<dyn SecondaryCredentialDelegate>> {
        self.delegate.read().await.clone()
    }

    async fn record(&self, operation: &'static str) -> Result<()> {
        *self.calls.write().await.entry(operation).or_default() += 1;
        debug!(operation, "sandbox interactor called");
        if self.config.fail_operation.as_deref() == Some(operation) {
            return Err(FlowError::Interactor(format!("{operation} failed")));
        }
        Ok(())
    }

    fn amount(&self) -> Result<Amount> {
        Amount::new(self.config.amount)
    }
}

#[async_trait]
impl FlowInteractor for SandboxInteractor {
    async fn validate(&self) -> Result<()> {
        self.record("validate").await
    }

    async fn load_primary_details(&self) -> Result<PrimaryDetails> {
        self.record("load_primary_details").await?;
        Ok(self.config.details.clone())
    }

    async fn persist_primary_details(&self, details: &PrimaryDetails) -> Result<()> {
        self.record("persist_primary_details").await?;
        *self.persisted.write().await = Some(details.clone());
        Ok(())
    }

    async fn start_secondary_credential_process(&self) -> Result<SecondaryPayload> {
        self.record("start_secondary_credential_process").await?;
        Ok(SecondaryPayload {
            payment_id: "pay_sandbox".to_string(),
            client_secret: "pay_sandbox_secret".to_string(),
        })
    }

    async fn create_secondary_collector_surface(
        &self,
        details: &PrimaryDetails,
        client_secret: &str,
        delegate: Arc<dyn SecondaryCredentialDelegate>,
    ) -> Result<SurfaceHandle> {
        self.record("create_secondary_collector_surface").await?;
        *self.delegate.write().await = Some(delegate);
        Ok(SurfaceHandle::new(SandboxCollector {
            client_secret: client_secret.to_string(),
            email_address: details.email_address.clone(),
        }))
    }

    async fn get_terms_data(&self) -> Result<TermsData> {
        self.record("get_terms_data").await?;
        Ok(TermsData {
            full_text: self.config.terms_full_text.clone(),
            template_name: self.config.terms_template_name.clone(),
        })
    }

    async fn tokenize(&self, authorization: &WalletAuthorization) -> Result<TokenData> {
        self.record("tokenize").await?;
        Ok(TokenData {
            token: format!("tok_{}", authorization.payment_data),
            payment_method_type: "WALLET".to_string(),
        })
    }

    async fn create_payment(&self, token: &TokenData) -> Result<PaymentResult> {
        self.record("create_payment").await?;
        Ok(PaymentResult {
            payment_id: format!("pay_{}", token.token),
            status: PaymentStatus::Success,
            amount: Some(self.amount()?),
            currency: Some(self.config.currency.clone()),
        })
    }

    async fn complete_payment(&self, payload: &SecondaryPayload) -> Result<PaymentResult> {
        self.record("complete_payment").await?;
        Ok(PaymentResult {
            payment_id: payload.payment_id.clone(),
            status: PaymentStatus::Success,
            amount: Some(self.amount()?),
            currency: Some(self.config.currency.clone()),
        })
    }
}

/// Everything a flow told its host, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HostEvent {
    Error(String),
    PaymentSucceeded(PaymentResult),
    NavigatedBack,
    Dismissed,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).clone()
    }

    fn push(&self, event: HostEvent) {
        lock(&self.events).push(event);
    }
}

impl CheckoutHost for RecordingHost {
    fn report_error(&self, error: &FlowError) {
        self.push(HostEvent::Error(error.to_string()));
    }

    fn payment_succeeded(&self, result: PaymentResult) {
        self.push(HostEvent::PaymentSucceeded(result));
    }

    fn navigate_back(&self) {
        self.push(HostEvent::NavigatedBack);
    }

    fn dismiss(&self) {
        self.push(HostEvent::Dismissed);
    }
}

/// Registry with a fixed set of payment methods.
#[derive(Debug, Clone)]
pub struct StaticPaymentMethodRegistry {
    methods: HashMap<String, PaymentMethodDescriptor>,
}

impl StaticPaymentMethodRegistry {
    pub fn new(methods: impl IntoIterator<Item = PaymentMethodDescriptor>) -> Self {
        Self {
            methods: methods
                .into_iter()
                .map(|method| (method.payment_method_type.clone(), method))
                .collect(),
        }
    }
}

impl Default for StaticPaymentMethodRegistry {
    fn default() -> Self {
        Self::new([
            PaymentMethodDescriptor {
                payment_method_type: "BANK_DEBIT".to_string(),
                kind: PaymentMethodKind::BankDebit,
                display_name: "Bank account".to_string(),
            },
            PaymentMethodDescriptor {
                payment_method_type: "WALLET".to_string(),
                kind: PaymentMethodKind::Wallet,
                display_name: "Wallet".to_string(),
            },
        ])
    }
}

impl PaymentMethodRegistry for StaticPaymentMethodRegistry {
    fn lookup(&self, payment_method_type: &str) -> Option<PaymentMethodDescriptor> {
        self.methods.get(payment_method_type.trim()).cloned()
    }
}

/// Wallet sheet that answers synchronously from its configuration.
#[derive(Debug)]
pub struct SandboxWalletSheet {
    presentable: bool,
    authorizes: bool,
    dismissals: Mutex<usize>,
}

impl SandboxWalletSheet {
    pub fn new(presentable: bool, authorizes: bool) -> Self {
        Self {
            presentable,
            authorizes,
            dismissals: Mutex::new(0),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.wallet_presentable, config.wallet_authorizes)
    }

    pub fn dismissals(&self) -> usize {
        *lock(&self.dismissals)
    }
}

impl ExternalSurface for SandboxWalletSheet {
    type Request = WalletRequest;
    type Output = WalletAuthorization;

    fn present(
        &self,
        request: WalletRequest,
        callbacks: BridgeCallbacks<WalletAuthorization>,
    ) -> std::result::Result<(), ExternalSurfaceError> {
        if !self.presentable {
            return Err(ExternalSurfaceError::PresentationFailed(
                "wallet sheet is not presentable".to_string(),
            ));
        }
        if self.authorizes {
            callbacks.succeeded(WalletAuthorization {
                payment_data: format!("{}_{}", request.merchant_name, request.amount.value())
                    .replace(' ', "_")
                    .to_lowercase(),
                network: Some("sandbox".to_string()),
            });
        } else {
            callbacks.cancelled();
        }
        Ok(())
    }

    fn dismiss(&self) {
        *lock(&self.dismissals) += 1;
    }
}

impl WalletSheet for SandboxWalletSheet {
    fn is_presentable(&self) -> bool {
        self.presentable
    }

    fn unavailability_reason(&self) -> Option<String> {
        (!self.presentable).then(|| "wallet is not set up on this device".to_string())
    }
}
