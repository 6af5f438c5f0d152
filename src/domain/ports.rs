use super::payment::{
    PaymentResult, SecondaryPayload, TermsData, TokenData, WalletAuthorization,
};
use super::state::PrimaryDetails;
use super::validation::FieldValidator;
use crate::error::{ExternalSurfaceError, FlowError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Network and side-effect operations a flow step needs.
///
/// Implementations are treated as stateless and may be shared across flows.
#[async_trait]
pub trait FlowInteractor: Send + Sync {
    async fn validate(&self) -> Result<()>;
    async fn load_primary_details(&self) -> Result<PrimaryDetails>;
    async fn persist_primary_details(&self, details: &PrimaryDetails) -> Result<()>;
    async fn start_secondary_credential_process(&self) -> Result<SecondaryPayload>;
    async fn create_secondary_collector_surface(
        &self,
        details: &PrimaryDetails,
        client_secret: &str,
        delegate: Arc<dyn SecondaryCredentialDelegate>,
    ) -> Result<SurfaceHandle>;
    async fn get_terms_data(&self) -> Result<TermsData>;

    async fn tokenize(&self, _authorization: &WalletAuthorization) -> Result<TokenData> {
        Err(FlowError::Unsupported("tokenize"))
    }

    async fn create_payment(&self, _token: &TokenData) -> Result<PaymentResult> {
        Err(FlowError::Unsupported("create_payment"))
    }

    async fn complete_payment(&self, payload: &SecondaryPayload) -> Result<PaymentResult>;
}

/// Side channel towards the host application.
pub trait CheckoutHost: Send + Sync {
    fn report_error(&self, error: &FlowError);
    fn payment_succeeded(&self, result: PaymentResult);
    fn navigate_back(&self);
    fn dismiss(&self);
}

/// Callbacks an external secondary-credential surface fires when it finishes.
///
/// Safe to call from any thread.
pub trait SecondaryCredentialDelegate: Send + Sync {
    fn on_succeeded(&self, identifier: String);
    fn on_cancelled(&self);
    fn on_failed(&self, error: ExternalSurfaceError);
}

/// Opaque reference to an externally constructed UI object.
#[derive(Clone)]
pub struct SurfaceHandle(Arc<dyn Any + Send + Sync>);

impl SurfaceHandle {
    pub fn new<S: Any + Send + Sync>(surface: S) -> Self {
        Self(Arc::new(surface))
    }

    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.0.downcast_ref::<S>()
    }

    pub fn ptr_eq(&self, other: &SurfaceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    BankDebit,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodDescriptor {
    pub payment_method_type: String,
    pub kind: PaymentMethodKind,
    pub display_name: String,
}

/// Lookup of the payment methods the host has configured.
pub trait PaymentMethodRegistry: Send + Sync {
    fn lookup(&self, payment_method_type: &str) -> Option<PaymentMethodDescriptor>;
}

pub type InteractorArc = Arc<dyn FlowInteractor>;
pub type HostArc = Arc<dyn CheckoutHost>;
pub type ValidatorArc = Arc<dyn FieldValidator>;
pub type RegistryBox = Box<dyn PaymentMethodRegistry>;
