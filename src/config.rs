use crate::domain::state::{PresentationContext, PrimaryDetails};
use crate::error::{FlowError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PAYMENT_METHOD: &str = "BANK_DEBIT";

/// Runtime settings for one checkout flow. Every field has a default, so an
/// empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub presentation_context: PresentationContext,
    /// Local timeout applied while waiting on an external surface.
    pub surface_timeout_ms: Option<u64>,
    pub payment_method: String,
    pub sandbox: SandboxConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            presentation_context: PresentationContext::default(),
            surface_timeout_ms: None,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl FlowConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: FlowConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.payment_method.trim().is_empty() {
            return Err(FlowError::Config("payment_method must not be empty".to_string()));
        }
        if self.surface_timeout_ms == Some(0) {
            return Err(FlowError::Config(
                "surface_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sandbox.amount <= Decimal::ZERO {
            return Err(FlowError::Config("sandbox.amount must be positive".to_string()));
        }
        Ok(())
    }

    pub fn surface_timeout(&self) -> Option<Duration> {
        self.surface_timeout_ms.map(Duration::from_millis)
    }
}

/// Behavior of the in-memory interactor and wallet sheet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub details: PrimaryDetails,
    pub terms_full_text: Option<String>,
    /// Merchant display name merged into the mandate template.
    pub terms_template_name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub country: String,
    /// Name of an interactor operation that should fail, e.g. `persist_primary_details`.
    pub fail_operation: Option<String>,
    pub wallet_presentable: bool,
    /// When false the wallet sheet reports a user cancellation.
    pub wallet_authorizes: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            details: PrimaryDetails::new("John", "Doe", "john@x.com"),
            terms_full_text: None,
            terms_template_name: Some("Example Merchant".to_string()),
            amount: Decimal::new(1000, 2),
            currency: "USD".to_string(),
            country: "US".to_string(),
            fail_operation: None,
            wallet_presentable: true,
            wallet_authorizes: true,
        }
    }
}
