//! Authorization context supplied by the caller.
//!
//! The acting user is a closed `{role, tier}` pair so every access decision
//! matches on the same variant instead of scattered string checks.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Platform role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Subscription tier of the acting user's organization.
///
/// `free` and `enterprise` are the two account tiers hosts send. Neither
/// grants an admin access beyond what they own. Full access is reserved for
/// operators of the platform itself, who carry the separate `platform` tier.
/// An actor sent without a tier is treated as `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    /// School or district account; admins are scoped to what they own.
    Enterprise,
    /// Platform operator; admins see everything.
    Platform,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub tier: Tier,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role, tier: Tier) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            tier,
        }
    }

    pub fn student(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Student, Tier::Free)
    }

    pub fn teacher(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Teacher, Tier::Free)
    }

    pub fn admin(user_id: impl Into<UserId>, tier: Tier) -> Self {
        Self::new(user_id, Role::Admin, tier)
    }

    /// Platform-wide admins skip the ownership check entirely.
    pub fn bypasses_ownership(&self) -> bool {
        matches!((self.role, self.tier), (Role::Admin, Tier::Platform))
    }

    /// Teachers and admins of any tier may act as graders.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }
}
