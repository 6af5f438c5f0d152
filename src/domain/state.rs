use super::validation::FieldValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named phase of the bank-debit flow.
///
/// The flow only moves forward through these steps, with a single retreat
/// from `SecondaryCredentialCollection` back to `PrimaryDetailsCollection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    #[default]
    Loading,
    PrimaryDetailsCollection,
    SecondaryCredentialCollection,
    TermsAcceptance,
    Processing,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStep::Loading => "loading",
            FlowStep::PrimaryDetailsCollection => "primary_details_collection",
            FlowStep::SecondaryCredentialCollection => "secondary_credential_collection",
            FlowStep::TermsAcceptance => "terms_acceptance",
            FlowStep::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// How the flow was reached: straight from the host, or from a payment
/// method list the user can go back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationContext {
    Direct,
    #[default]
    FromSelection,
}

impl PresentationContext {
    pub fn should_show_back_button(&self) -> bool {
        matches!(self, PresentationContext::FromSelection)
    }
}

/// User-editable fields collected in `PrimaryDetailsCollection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FirstName,
    LastName,
    EmailAddress,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::FirstName, Field::LastName, Field::EmailAddress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::FirstName => "first_name",
            Field::LastName => "last_name",
            Field::EmailAddress => "email_address",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first_name" => Ok(Field::FirstName),
            "last_name" => Ok(Field::LastName),
            "email_address" | "email" => Ok(Field::EmailAddress),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryDetails {
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
}

impl PrimaryDetails {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email_address: email_address.into(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::EmailAddress => &self.email_address,
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        match field {
            Field::FirstName => self.first_name = value,
            Field::LastName => self.last_name = value,
            Field::EmailAddress => self.email_address = value,
        }
    }
}

/// Snapshot of one flow: its current step and everything needed to render it.
///
/// Values are replaced wholesale on every transition. Only the flow state
/// machine produces new values; the presentation layer reads them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FlowState {
    pub step: FlowStep,
    pub primary: PrimaryDetails,
    /// Inline errors keyed by field. Empty fields never carry an error.
    pub field_errors: BTreeMap<Field, String>,
    pub terms_text: Option<String>,
    pub is_submit_enabled: bool,
    pub is_loading: bool,
    /// Whether the scope currently owns a secondary-credential surface.
    pub surface_present: bool,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_field_errors(&self) -> bool {
        !self.field_errors.is_empty()
    }

    /// Recomputes the derived fields (`field_errors`, `is_submit_enabled`)
    /// from the primary details and the current step.
    pub fn revalidated(mut self, validator: &dyn FieldValidator) -> Self {
        self.field_errors = Field::ALL
            .iter()
            .filter_map(|&field| {
                let value = self.primary.get(field);
                if value.is_empty() {
                    return None;
                }
                validator.validate(field, value).err().map(|msg| (field, msg))
            })
            .collect();

        self.is_submit_enabled = match self.step {
            FlowStep::PrimaryDetailsCollection => {
                !self.is_loading
                    && Field::ALL
                        .iter()
                        .all(|&field| validator.validate(field, self.primary.get(field)).is_ok())
            }
            FlowStep::TermsAcceptance => !self.is_loading,
            FlowStep::Loading
            | FlowStep::SecondaryCredentialCollection
            | FlowStep::Processing => false,
        };
        self
    }
}
