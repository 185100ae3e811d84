//! The authenticated caller, as handed over by the authentication layer.

use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl TryFrom<&str> for Role {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(EngineError::InvalidField(format!("invalid role: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub role: Role,
}

impl Principal {
    pub fn user(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: Role::User,
        }
    }

    pub fn admin(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// `true` when the caller owns `owner_id`'s data or is an admin.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.uid == owner_id
    }
}
