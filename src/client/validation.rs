//! 请求预检：在任何网络调用之前校验负载大小和提示词。
//!
//! Pre-flight input validation.
//!
//! These checks run before a slot is acquired or a remote call is made, so invalid input never
//! costs a network round trip.

use crate::resilience::Operation;
use crate::{Error, ErrorContext, Result};

/// Reject an empty payload or one above `limit` bytes.
pub fn validate_payload(op: Operation, field: &str, bytes: &[u8], limit: usize) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::validation_with_context(
            format!("{} is empty", field),
            ErrorContext::new()
                .with_operation(op.as_str())
                .with_source("payload_validator"),
        ));
    }
    if bytes.len() > limit {
        return Err(Error::PayloadTooLarge {
            size: bytes.len(),
            limit,
            context: ErrorContext::new()
                .with_operation(op.as_str())
                .with_details(field.to_string())
                .with_source("payload_validator"),
        });
    }
    Ok(())
}

/// Validate the inputs of an `analyze` call.
pub fn validate_analyze(image: &[u8], limit: usize) -> Result<()> {
    validate_payload(Operation::Analyze, "image", image, limit)
}

/// Validate the inputs of a `generate` call and return the trimmed prompt.
pub fn validate_generate<'p>(
    image: &[u8],
    mask: Option<&[u8]>,
    prompt: &'p str,
    limit: usize,
) -> Result<&'p str> {
    validate_payload(Operation::Generate, "image", image, limit)?;
    if let Some(mask) = mask {
        validate_payload(Operation::Generate, "mask", mask, limit)?;
    }
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(Error::validation_with_context(
            "prompt must not be empty",
            ErrorContext::new()
                .with_operation(Operation::Generate.as_str())
                .with_source("prompt_validator"),
        ));
    }
    Ok(prompt)
}
