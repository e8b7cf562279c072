//! Caller identity as handed over by the access gate.
//!
//! Credential checks happen before a request reaches the engine.
//! The engine only compares the verified role with the one an
//! operation requires.

use crate::{
    error::{LoanError, LoanResult},
    types::UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Requester,
    Investor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin     => "admin",
            Self::Requester => "requester",
            Self::Investor  => "investor",
        })
    }
}

/// A verified caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role:    Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn requester(user_id: UserId) -> Self {
        Self::new(user_id, Role::Requester)
    }

    pub fn investor(user_id: UserId) -> Self {
        Self::new(user_id, Role::Investor)
    }

    pub fn require(&self, role: Role) -> LoanResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(LoanError::Forbidden { required: role, actual: self.role })
        }
    }
}
