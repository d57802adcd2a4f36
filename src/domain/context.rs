//! Operation Context
//!
//! Metadata about the current operation: who performs it and how it is
//! traced. The identity is supplied by the authentication boundary; the
//! ledger never verifies credentials itself.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::types::ActorRole;
use super::DomainError;

/// Authenticated actor performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub display_name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, display_name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
        }
    }
}

/// Context for an operation, used for auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Actor on whose behalf the operation runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,

    /// API key ID used for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<Uuid>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            actor: None,
            api_key_id: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_api_key(mut self, api_key_id: Uuid) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// The acting identity; every audited mutation requires one.
    pub fn require_actor(&self) -> Result<&Actor, DomainError> {
        self.actor
            .as_ref()
            .ok_or_else(|| DomainError::Unauthorized("no authenticated actor".to_string()))
    }

    /// The acting identity, which must hold at least `role`.
    pub fn require_role(&self, role: ActorRole) -> Result<&Actor, DomainError> {
        let actor = self.require_actor()?;
        if !actor.role.at_least(role) {
            return Err(DomainError::Unauthorized(format!(
                "{} role required, actor {} is {}",
                role, actor.id, actor.role
            )));
        }
        Ok(actor)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
