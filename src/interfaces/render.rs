//! Text rendering of flow steps, with host-supplied overrides.

use crate::domain::state::{Field, FlowState, FlowStep};
use std::fmt;
use std::sync::Arc;

/// Renders a whole step.
pub trait StepRenderer: Send + Sync {
    fn render(&self, state: &FlowState) -> String;
}

/// Renders the primary action control.
pub trait ActionRenderer: Send + Sync {
    fn render(&self, label: &str, enabled: bool) -> String;
}

/// Optional replacements for the default renderers. Each override replaces
/// exactly one default.
#[derive(Clone, Default)]
pub struct FlowCustomization {
    /// Replaces the rendering of every step.
    pub screen: Option<Arc<dyn StepRenderer>>,
    pub primary_details_screen: Option<Arc<dyn StepRenderer>>,
    pub terms_screen: Option<Arc<dyn StepRenderer>>,
    pub submit_button: Option<Arc<dyn ActionRenderer>>,
}

impl fmt::Debug for FlowCustomization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowCustomization")
            .field("screen", &self.screen.is_some())
            .field("primary_details_screen", &self.primary_details_screen.is_some())
            .field("terms_screen", &self.terms_screen.is_some())
            .field("submit_button", &self.submit_button.is_some())
            .finish()
    }
}

pub fn render_state(customization: &FlowCustomization, state: &FlowState) -> String {
    if let Some(screen) = &customization.screen {
        return screen.render(state);
    }

    let body = match state.step {
        FlowStep::PrimaryDetailsCollection => match &customization.primary_details_screen {
            Some(renderer) => renderer.render(state),
            None => default_primary_details(state),
        },
        FlowStep::TermsAcceptance => match &customization.terms_screen {
            Some(renderer) => renderer.render(state),
            None => default_terms(state),
        },
        FlowStep::Loading => "Loading...".to_string(),
        FlowStep::SecondaryCredentialCollection => {
            "Connecting your bank account...".to_string()
        }
        FlowStep::Processing => "Processing payment...".to_string(),
    };

    match action_label(state.step) {
        Some(label) => {
            let button = match &customization.submit_button {
                Some(renderer) => renderer.render(label, state.is_submit_enabled),
                None => default_button(label, state.is_submit_enabled),
            };
            format!("{body}\n{button}")
        }
        None => body,
    }
}

fn action_label(step: FlowStep) -> Option<&'static str> {
    match step {
        FlowStep::PrimaryDetailsCollection => Some("Continue"),
        FlowStep::TermsAcceptance => Some("Accept"),
        _ => None,
    }
}

fn default_primary_details(state: &FlowState) -> String {
    Field::ALL
        .iter()
        .map(|&field| {
            let line = format!("{field}: {}", state.primary.get(field));
            match state.field_errors.get(&field) {
                Some(error) => format!("{line} ({error})"),
                None => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn default_terms(state: &FlowState) -> String {
    state.terms_text.clone().unwrap_or_default()
}

fn default_button(label: &str, enabled: bool) -> String {
    if enabled {
        format!("[ {label} ]")
    } else {
        format!("[ {label} (disabled) ]")
    }
}
