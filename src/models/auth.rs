use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserRole;

/// Claims embedded in the JWT access token (issued by the identity service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // user UUID
    pub tenant: String, // garderie slug
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
}

/// Extracted from the validated JWT — available via Axum extractors
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub tenant: String,
    pub role: UserRole,
}

/// Who is asking for an attendance mutation. Parents must be linked to the
/// child they act on; staff may act on any child of the tenant.
#[derive(Debug, Clone, Copy)]
pub enum ActorRef {
    Parent(Uuid),
    Staff(Uuid),
}

impl ActorRef {
    pub fn user_id(&self) -> Uuid {
        match self {
            ActorRef::Parent(id) | ActorRef::Staff(id) => *id,
        }
    }

    pub fn from_user(user: &AuthenticatedUser) -> Self {
        if user.role.is_staff() {
            ActorRef::Staff(user.user_id)
        } else {
            ActorRef::Parent(user.user_id)
        }
    }
}
