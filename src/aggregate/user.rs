//! User Aggregate
//!
//! Operators of the ledger (agents, supervisors, administrators). Users are
//! the actors recorded in every audit stamp; authentication itself happens
//! at the API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditRecord, Audited};
use crate::domain::{Actor, ActorRole, DomainError, UserChanges, UserEvent};

use super::{require_text, Aggregate};

/// Registration input for a new user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub country_code: Option<String>,
    pub role: ActorRole,
}

/// User Aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    username: String,
    first_name: String,
    last_name: String,
    phone: String,
    email: String,
    country_code: Option<String>,
    role: ActorRole,
    audit: AuditRecord,
    version: i64,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            email: String::new(),
            country_code: None,
            role: ActorRole::Agent,
            audit: AuditRecord::default(),
            version: 0,
        }
    }
}

fn validate_email(email: &str) -> Result<String, DomainError> {
    let email = require_text("email", email, 100)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(DomainError::validation(format!("invalid email: {}", email))),
    }
}

impl User {
    /// Register a new user and generate the registration event
    pub fn register(
        user_id: Uuid,
        input: NewUser,
        registered_by: Uuid,
    ) -> Result<(Self, UserEvent), DomainError> {
        let event = UserEvent::UserRegistered {
            user_id,
            username: require_text("username", &input.username, 50)?,
            first_name: require_text("first_name", &input.first_name, 50)?,
            last_name: require_text("last_name", &input.last_name, 50)?,
            phone: require_text("phone", &input.phone, 20)?,
            email: validate_email(&input.email)?,
            country_code: match input.country_code {
                Some(code) => Some(require_text("country_code", &code, 3)?.to_uppercase()),
                None => None,
            },
            role: input.role,
            registered_by,
            registered_at: Utc::now(),
        };

        let user = Self::default().apply(event.clone());
        Ok((user, event))
    }

    /// Update contact details or role
    pub fn update(&self, changes: UserChanges, updated_by: Uuid) -> Result<UserEvent, DomainError> {
        self.ensure_active()?;

        if changes.is_empty() {
            return Err(DomainError::validation("no changes provided"));
        }

        let changes = UserChanges {
            phone: changes
                .phone
                .map(|p| require_text("phone", &p, 20))
                .transpose()?,
            email: changes.email.map(|e| validate_email(&e)).transpose()?,
            role: changes.role,
        };

        Ok(UserEvent::UserUpdated {
            user_id: self.id,
            changes,
            updated_by,
            updated_at: Utc::now(),
        })
    }

    /// Soft-delete the user
    pub fn delete(&self, deleted_by: Uuid) -> Result<UserEvent, DomainError> {
        self.ensure_active()?;
        if deleted_by == self.id {
            return Err(DomainError::validation("users cannot delete themselves"));
        }

        Ok(UserEvent::UserDeleted {
            user_id: self.id,
            deleted_by,
            deleted_at: Utc::now(),
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.audit.is_deleted() {
            return Err(DomainError::not_found("User", self.id));
        }
        Ok(())
    }

    /// Identity used in operation contexts
    pub fn as_actor(&self) -> Actor {
        Actor::new(self.id, self.full_name(), self.role)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.audit.created_at
    }
}

impl Audited for User {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }
}

impl Aggregate for User {
    type Event = UserEvent;

    fn aggregate_type() -> &'static str {
        "User"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            UserEvent::UserRegistered {
                user_id,
                username,
                first_name,
                last_name,
                phone,
                email,
                country_code,
                role,
                registered_by,
                registered_at,
            } => {
                self.id = user_id;
                self.username = username;
                self.first_name = first_name;
                self.last_name = last_name;
                self.phone = phone;
                self.email = email;
                self.country_code = country_code;
                self.role = role;
                self.audit = AuditRecord::inserted(registered_by, registered_at);
            }

            UserEvent::UserUpdated {
                changes,
                updated_by,
                updated_at,
                ..
            } => {
                if let Some(phone) = changes.phone {
                    self.phone = phone;
                }
                if let Some(email) = changes.email {
                    self.email = email;
                }
                if let Some(role) = changes.role {
                    self.role = role;
                }
                self.audit.touch(updated_by, updated_at);
            }

            UserEvent::UserDeleted {
                deleted_by,
                deleted_at,
                ..
            } => {
                self.audit.mark_deleted(deleted_by, deleted_at);
            }
        }

        self.version += 1;
        self
    }
}
