//! Request actors
//!
//! The authentication boundary hands the core an already verified actor.
//! Nothing here checks signatures or request freshness.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorRole {
    /// Driver app acting for a user
    User,
    /// Station firmware reporting hardware status
    Station,
    /// Operator dashboard
    Admin,
    /// Internal background processes (watchdog)
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Station => "station",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "station" => Some(Self::Station),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified caller of a core operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
    pub requested_at: DateTime<Utc>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role,
            requested_at,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::User, Utc::now())
    }

    pub fn station(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Station, Utc::now())
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin, Utc::now())
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(name, ActorRole::System, Utc::now())
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(ActorRole::parse("Admin"), Some(ActorRole::Admin));
        assert_eq!(ActorRole::parse(" station "), Some(ActorRole::Station));
        assert_eq!(ActorRole::parse("root"), None);
    }

    #[test]
    fn display_includes_role() {
        assert_eq!(Actor::user("U1").to_string(), "user:U1");
    }
}
