use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use validator::{Validate, ValidationError};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("email pattern is valid")
});

/// Form inputs that can carry a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Name,
    Email,
    CardNumber,
    CardExpiry,
    CardCvc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMessage {
    pub field: FormField,
    pub message: String,
}

impl FieldMessage {
    pub fn new(field: FormField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Signed-in user as reported by the identity service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Payer name and email, sent as billing details with the confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PayerDetails {
    #[validate(custom = "validate_payer_name")]
    pub name: String,
    #[validate(custom = "validate_payer_email")]
    pub email: String,
}

impl PayerDetails {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        validate_payer_name(&self.name).is_ok() && validate_payer_email(&self.email).is_ok()
    }

    /// Messages for each invalid field, name first.
    pub fn messages(&self) -> Vec<FieldMessage> {
        let mut messages = Vec::new();
        if let Err(err) = validate_payer_name(&self.name) {
            messages.push(FieldMessage::new(FormField::Name, message_of(&err)));
        }
        if let Err(err) = validate_payer_email(&self.email) {
            messages.push(FieldMessage::new(FormField::Email, message_of(&err)));
        }
        messages
    }
}

impl From<&AuthenticatedUser> for PayerDetails {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            name: user.name.clone().unwrap_or_default(),
            email: user.email.clone().unwrap_or_default(),
        }
    }
}

fn message_of(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}

fn validate_payer_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("Name is required".into());
        return Err(err);
    }
    Ok(())
}

fn validate_payer_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("Email is required".into());
        return Err(err);
    }
    if !EMAIL_PATTERN.is_match(email) {
        let mut err = ValidationError::new("email");
        err.message = Some("Invalid email address".into());
        return Err(err);
    }
    Ok(())
}
