use validator::{Validate, ValidationErrors};

use crate::api::errors::ApiError;

pub(crate) fn validate_payload<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(describe(&errors)))
}

/// Flattens validator output into `field: code` pairs, sorted so responses are stable.
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, failures)| {
            let codes: Vec<&str> = failures.iter().map(|failure| failure.code.as_ref()).collect();
            format!("{field}: {}", codes.join(", "))
        })
        .collect();
    if fields.is_empty() {
        return "Invalid request payload".to_string();
    }
    fields.sort();
    format!("Invalid request payload ({})", fields.join("; "))
}
