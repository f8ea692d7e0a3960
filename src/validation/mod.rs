use bigdecimal::BigDecimal;
use std::fmt;

use crate::domain::REFERRAL_CODE_LEN;

pub const NAME_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 255;
pub const REMARKS_MAX_LEN: usize = 500;
pub const ACCOUNT_FIELD_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    let email = sanitize_string(email);
    validate_required("email", &email)?;
    validate_max_len("email", &email, EMAIL_MAX_LEN)?;

    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError::new("email", "is not a valid address"));
    }

    Ok(())
}

/// Optional leading `+`, then 7 to 15 digits.
pub fn validate_phone(phone: &str) -> ValidationResult {
    let phone = sanitize_string(phone);
    let digits = phone.strip_prefix('+').unwrap_or(&phone);

    if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "is not a valid phone number"));
    }

    Ok(())
}

pub fn validate_referral_code(code: &str) -> ValidationResult {
    let code = sanitize_string(code);
    validate_required("referral_code", &code)?;

    if code.len() != REFERRAL_CODE_LEN {
        return Err(ValidationError::new(
            "referral_code",
            format!("must be exactly {} characters", REFERRAL_CODE_LEN),
        ));
    }

    if !code
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            "referral_code",
            "must contain only uppercase letters and digits",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// 0..=100 inclusive, the range commission percentages are expressed in.
pub fn validate_percentage(field: &'static str, value: &BigDecimal) -> ValidationResult {
    if value < &BigDecimal::from(0) || value > &BigDecimal::from(100) {
        return Err(ValidationError::new(field, "must be between 0 and 100"));
    }

    Ok(())
}
