//! Tenant identifiers and generated secrets.

use crate::error::{ProvisionError, ProvisionResult};

/// Longest tenant ID accepted; it must fit in a single DNS label.
pub const MAX_TENANT_ID_LEN: usize = 63;

/// Check that `tenant_id` can serve as a container-name suffix and a
/// DNS label: lowercase ASCII letters, digits, and inner hyphens.
pub fn validate_tenant_id(tenant_id: &str) -> ProvisionResult<()> {
    if tenant_id.is_empty() {
        return Err(ProvisionError::Validation("tenant_id is required".to_string()));
    }
    let valid_chars = tenant_id
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid_chars
        || tenant_id.len() > MAX_TENANT_ID_LEN
        || tenant_id.starts_with('-')
        || tenant_id.ends_with('-')
    {
        return Err(ProvisionError::Validation(format!(
            "invalid tenant_id {tenant_id:?}: use 1-{MAX_TENANT_ID_LEN} lowercase letters, digits, or inner hyphens"
        )));
    }
    Ok(())
}

/// Fresh 16-character hex tenant ID.
pub fn generate_tenant_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Fresh 32-character hex token for a tenant's gateway auth.
pub fn generate_access_token() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
