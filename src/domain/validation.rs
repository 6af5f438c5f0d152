use super::state::Field;

/// Field-level validation rules, owned by the host's validation service.
pub trait FieldValidator: Send + Sync {
    /// Returns the inline error message when `value` is not acceptable.
    fn validate(&self, field: Field, value: &str) -> Result<(), String>;
}

const MAX_NAME_LENGTH: usize = 45;

/// Rules used when the host does not inject its own validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFieldValidator;

impl FieldValidator for DefaultFieldValidator {
    fn validate(&self, field: Field, value: &str) -> Result<(), String> {
        let valid = match field {
            Field::FirstName | Field::LastName => is_valid_name(value),
            Field::EmailAddress => is_valid_email(value),
        };
        if valid {
            Ok(())
        } else {
            Err(error_message(field).to_string())
        }
    }
}

fn error_message(field: Field) -> &'static str {
    match field {
        Field::FirstName => "Please enter a valid first name",
        Field::LastName => "Please enter a valid last name",
        Field::EmailAddress => "Please enter a valid email address",
    }
}

fn is_valid_name(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_NAME_LENGTH
        && trimmed
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\'' | '.'))
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
