//! Per-request caller context
//!
//! Constructed from transport headers at the gateway and forwarded to every
//! downstream client so authentication travels with the request.

use serde::{Deserialize, Serialize};

/// Identity and credentials of the caller of a single RPC
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller principal (user or service account)
    pub caller: String,
    /// Tenant the request is scoped to
    pub tenant: String,
    /// Opaque auth token forwarded to downstream services
    pub auth_token: Option<String>,
}

impl RequestContext {
    /// Create a context for a caller in a tenant
    #[must_use]
    pub fn new(caller: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            tenant: tenant.into(),
            auth_token: None,
        }
    }

    /// Attach an auth token
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Context used for internal maintenance passes that predate any request
    #[must_use]
    pub fn internal() -> Self {
        Self::new("system", "internal")
    }
}
