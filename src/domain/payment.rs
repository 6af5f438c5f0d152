use crate::error::FlowError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a positive monetary amount charged by a payment.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, FlowError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(FlowError::Validation {
                field: "amount".to_string(),
                message: "Amount must be positive".to_string(),
            })
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = FlowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Data returned when the secondary-credential process starts: the payment
/// already created server side and the secret the collector surface needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryPayload {
    pub payment_id: String,
    pub client_secret: String,
}

/// Terms (mandate) data. `full_text` wins over `template_name` when both are set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TermsData {
    pub full_text: Option<String>,
    pub template_name: Option<String>,
}

impl TermsData {
    /// Resolves the text shown in `TermsAcceptance`. Missing data yields an
    /// empty string so the step still renders.
    pub fn into_text(self) -> String {
        match (self.full_text, self.template_name) {
            (Some(full_text), _) => full_text,
            (None, Some(name)) => mandate_template(&name),
            (None, None) => String::new(),
        }
    }
}

fn mandate_template(name: &str) -> String {
    format!(
        "By clicking Accept, you authorize {name} to debit the bank account specified above \
         for any amount owed for charges arising from your use of {name}'s services and/or \
         purchase of products from {name}, pursuant to {name}'s website and terms, until this \
         authorization is revoked."
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub token: String,
    pub payment_method_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// Terminal payment outcome handed to the host out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: Option<Amount>,
    pub currency: Option<String>,
}

/// What the wallet sheet is asked to authorize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRequest {
    pub merchant_name: String,
    pub amount: Amount,
    pub currency_code: String,
    pub country_code: String,
}

/// Opaque authorization produced by the wallet sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAuthorization {
    pub payment_data: String,
    pub network: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(FlowError::Validation { .. })
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(FlowError::Validation { .. })
        ));
    }

    #[test]
    fn test_amount_deserialization_rejects_negative() {
        let ok: Amount = serde_json::from_str("\"10.50\"").unwrap();
        assert_eq!(ok.value(), dec!(10.50));
        assert!(serde_json::from_str::<Amount>("\"-3\"").is_err());
    }

    #[test]
    fn test_terms_prefers_full_text() {
        let terms = TermsData {
            full_text: Some("ABC".to_string()),
            template_name: Some("Acme".to_string()),
        };
        assert_eq!(terms.into_text(), "ABC");
    }

    #[test]
    fn test_terms_template_contains_display_name() {
        let terms = TermsData {
            full_text: None,
            template_name: Some("Acme Corp".to_string()),
        };
        let text = terms.into_text();
        assert!(text.contains("Acme Corp"));
        assert!(text.starts_with("By clicking Accept"));
    }

    #[test]
    fn test_terms_without_data_is_empty() {
        assert_eq!(TermsData::default().into_text(), "");
    }
}
