use invoicer_core::{DomainError, DomainResult};

/// Trim a required field; blank is a validation error.
pub(crate) fn required(field: &str, value: &str, message: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, message));
    }
    max_len(field, trimmed, 255)?;
    Ok(trimmed.to_string())
}

/// Trim an optional field; blank collapses to `None`.
pub(crate) fn optional(field: &str, value: Option<String>, max: usize) -> DomainResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            max_len(field, &v, max)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

pub(crate) fn max_len(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.chars().count() > max {
        return Err(DomainError::validation(
            field,
            format!("{field} must be at most {max} characters"),
        ));
    }
    Ok(())
}
