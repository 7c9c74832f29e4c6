//! Request gateway: authorization and audit
//!
//! Every RPC passes through the gateway before touching any state: the
//! project scope is checked for existence, the access policy is consulted for
//! the permission class the RPC needs, and a structured audit event naming
//! the caller is emitted.

use mts_core::{Error, RequestContext, Result};
use mts_store::{MetadataCatalog, MetadataCatalogExt};
use std::sync::Arc;
use tracing::info;

/// Permission classes, by RPC kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read test definitions
    View,
    /// Create or delete test definitions
    Update,
    /// Evaluate tests against a model
    Analyze,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::View => write!(f, "view"),
            Self::Update => write!(f, "update"),
            Self::Analyze => write!(f, "analyze"),
        }
    }
}

/// Role-based access decisions, scoped to a project
pub trait AccessPolicy: Send + Sync {
    /// Allow or deny the caller the given permission on the project
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] when the caller lacks the permission.
    fn authorize(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        permission: Permission,
    ) -> Result<()>;
}

/// Policy that admits every caller; the default for embedded use where the
/// surrounding deployment enforces access
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllPolicy;

impl AccessPolicy for AllowAllPolicy {
    fn authorize(&self, _ctx: &RequestContext, _project_id: &str, _: Permission) -> Result<()> {
        Ok(())
    }
}

/// Policy that denies every caller; a test double
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllPolicy;

impl AccessPolicy for DenyAllPolicy {
    fn authorize(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        permission: Permission,
    ) -> Result<()> {
        Err(Error::PermissionDenied(format!(
            "caller {} lacks {permission} permission on project {project_id}",
            ctx.caller
        )))
    }
}

/// Authorization plus audit for every RPC
pub struct RequestGateway {
    policy: Arc<dyn AccessPolicy>,
    metadata: Arc<dyn MetadataCatalog>,
    host: String,
}

impl RequestGateway {
    /// Create a gateway over a policy and metadata catalog
    #[must_use]
    pub fn new(policy: Arc<dyn AccessPolicy>, metadata: Arc<dyn MetadataCatalog>) -> Self {
        let host = hostname::get()
            .map_or_else(|_| "unknown".to_string(), |h| h.to_string_lossy().to_string());
        Self {
            policy,
            metadata,
            host,
        }
    }

    /// Authorize a read RPC
    ///
    /// # Errors
    ///
    /// Missing project id, unknown project, or policy denial.
    pub fn authorize_view(&self, ctx: &RequestContext, rpc: &str, project_id: &str) -> Result<()> {
        self.authorize(ctx, rpc, project_id, Permission::View)
    }

    /// Authorize a write RPC
    ///
    /// # Errors
    ///
    /// Missing project id, unknown project, or policy denial.
    pub fn authorize_update(
        &self,
        ctx: &RequestContext,
        rpc: &str,
        project_id: &str,
    ) -> Result<()> {
        self.authorize(ctx, rpc, project_id, Permission::Update)
    }

    /// Authorize an evaluation RPC
    ///
    /// # Errors
    ///
    /// Missing project id, unknown project, or policy denial.
    pub fn authorize_analyze(
        &self,
        ctx: &RequestContext,
        rpc: &str,
        project_id: &str,
    ) -> Result<()> {
        self.authorize(ctx, rpc, project_id, Permission::Analyze)
    }

    fn authorize(
        &self,
        ctx: &RequestContext,
        rpc: &str,
        project_id: &str,
        permission: Permission,
    ) -> Result<()> {
        if project_id.is_empty() {
            return Err(Error::InvalidArgument(
                "project_id missing in request".to_string(),
            ));
        }
        self.metadata.require_project(project_id)?;
        self.policy.authorize(ctx, project_id, permission)?;
        info!(
            target: "audit",
            rpc,
            caller = %ctx.caller,
            tenant = %ctx.tenant,
            project_id,
            permission = %permission,
            host = %self.host,
            "authorized request"
        );
        Ok(())
    }
}
