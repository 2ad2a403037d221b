//! Structural checks for caller-supplied protocol fields.

use crate::error::ValidationError;
use crate::subscription::SubscriptionRequest;

/// Maximum length of a trust description, in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Validate a subscription target.
///
/// Targets may not contain `:` (reserved by suspension keys) or `/`
/// (reserved by resource paths).
pub fn validate_target(target: &str) -> Result<(), ValidationError> {
    if target.is_empty() {
        return Err(ValidationError::EmptyTarget);
    }
    for ch in [':', '/'] {
        if target.contains(ch) {
            return Err(ValidationError::ReservedCharacter { field: "target", ch });
        }
    }
    Ok(())
}

/// Validate a subtarget. Empty is allowed (wildcard).
pub fn validate_subtarget(subtarget: &str) -> Result<(), ValidationError> {
    if subtarget.contains(':') {
        return Err(ValidationError::ReservedCharacter {
            field: "subtarget",
            ch: ':',
        });
    }
    Ok(())
}

/// Validate a subscription request.
pub fn validate_subscription_request(request: &SubscriptionRequest) -> Result<(), ValidationError> {
    validate_target(&request.target)?;
    validate_subtarget(&request.subtarget)?;
    Ok(())
}

/// Validate a relationship type: non-empty `[A-Za-z0-9_-]`.
pub fn validate_relationship_type(relationship_type: &str) -> Result<(), ValidationError> {
    let ok = !relationship_type.is_empty()
        && relationship_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidRelationshipType(
            relationship_type.to_string(),
        ))
    }
}

/// Validate a peer base uri: `http://` or `https://` followed by a host.
pub fn validate_base_uri(base_uri: &str) -> Result<(), ValidationError> {
    let rest = base_uri
        .strip_prefix("https://")
        .or_else(|| base_uri.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(ValidationError::InvalidBaseUri(base_uri.to_string())),
    }
}

/// Validate a trust description.
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong {
            max: MAX_DESCRIPTION_LEN,
            got: description.len(),
        });
    }
    Ok(())
}
