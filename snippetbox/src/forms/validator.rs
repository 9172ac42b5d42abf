//! Per-form error collection and field rules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Loose RFC 5322 shape check, the same one browsers use for `type=email`.
pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is valid")
});

/// Errors gathered while validating one form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn add_field_error(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check_field(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.add_field_error(field, message);
        }
    }
}

/// A form that carries its own [`Validator`].
pub trait Validated {
    fn validator(&self) -> &Validator;
    fn validator_mut(&mut self) -> &mut Validator;

    fn valid(&self) -> bool {
        self.validator().valid()
    }

    fn check_field(&mut self, ok: bool, field: &str, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.validator_mut().check_field(ok, field, message);
    }

    fn add_field_error(&mut self, field: &str, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.validator_mut().add_field_error(field, message);
    }

    fn add_non_field_error(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.validator_mut().add_non_field_error(message);
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Counts characters, not bytes.
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// Two fields that must hold the same value, e.g. a new password and its confirmation.
pub fn equal<T: PartialEq + ?Sized>(a: &T, b: &T) -> bool {
    a == b
}
