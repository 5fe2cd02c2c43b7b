//! Caller identity for the operator endpoints.

use axum::http::{header, HeaderMap};
use relay_core::models::TenantIntegration;
use relay_core::RelayError;
use uuid::Uuid;

use crate::state::RelayState;

#[derive(Debug, Clone)]
pub enum Caller {
    /// Holder of the configured service key; acts on behalf of any tenant.
    Service,
    /// A tenant authenticated by its own API token.
    Tenant(TenantIntegration),
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn authenticate(state: &RelayState, headers: &HeaderMap) -> Result<Caller, RelayError> {
    let token = bearer_token(headers)
        .ok_or_else(|| RelayError::Unauthorized("missing bearer token".to_string()))?;

    let service_key = state.config.auth.service_key.as_str();
    if !service_key.is_empty() && token == service_key {
        return Ok(Caller::Service);
    }

    match state.store.find_tenant_by_token(token).await? {
        Some(tenant) => Ok(Caller::Tenant(tenant)),
        None => Err(RelayError::Unauthorized("invalid token".to_string())),
    }
}

impl Caller {
    /// The tenant this call acts for. Service callers must name it; tenant
    /// callers may only name themselves.
    pub async fn tenant(
        &self,
        state: &RelayState,
        requested: Option<Uuid>,
    ) -> Result<TenantIntegration, RelayError> {
        match self {
            Caller::Service => {
                let tenant_id = requested.ok_or_else(|| {
                    RelayError::Other("Missing tenant_id for system call".to_string())
                })?;
                state
                    .store
                    .get_tenant_config(tenant_id)
                    .await?
                    .ok_or_else(|| RelayError::Other(format!("Tenant {} not found", tenant_id)))
            }
            Caller::Tenant(tenant) => match requested {
                Some(id) if id != tenant.tenant_id => Err(RelayError::Unauthorized(
                    "token does not belong to the requested tenant".to_string(),
                )),
                _ => Ok(tenant.clone()),
            },
        }
    }
}
