use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Field-level violations collected by a failed save.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str, message: &str) -> bool {
        self.get(field).iter().any(|m| m == message)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    /// Messages prefixed with the humanized field name, e.g. "Email is invalid".
    pub fn full_messages(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(|(field, msgs)| {
                let label = humanize(field);
                msgs.iter().map(move |m| format!("{} {}", label, m))
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("user not found")]
    NotFound,

    #[error("no wireless provider associated with user")]
    MissingProvider,

    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UserError {
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            UserError::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Failures reported by a `UserRepo`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("wireless provider does not exist")]
    UnknownProvider,

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_messages_humanize_field_names() {
        let mut errors = ValidationErrors::new();
        errors.add("password_confirmation", "can't be blank");
        errors.add("email", "is invalid");
        assert_eq!(
            errors.full_messages(),
            vec![
                "Email is invalid".to_string(),
                "Password confirmation can't be blank".to_string()
            ]
        );
        assert_eq!(
            errors.to_string(),
            "Email is invalid, Password confirmation can't be blank"
        );
    }

    #[test]
    fn serializes_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "can't be blank");
        errors.add("name", "is too long (maximum is 50 characters)");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": ["can't be blank", "is too long (maximum is 50 characters)"]
            })
        );
    }

    #[test]
    fn get_returns_empty_slice_for_clean_field() {
        let errors = ValidationErrors::new();
        assert!(errors.is_empty());
        assert!(errors.get("bio").is_empty());
        assert!(!errors.contains("bio", "is invalid"));
    }
}
