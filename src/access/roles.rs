//! Roles, principals and the role table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// PRINCIPAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque caller identity (an address, public key or service name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from any string-like identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability held by a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes roles; implies `Manager`
    Admin,
    /// Mutates the registry, recomputes, tunes the deviation threshold
    Manager,
}

impl Role {
    /// Get role name
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
        }
    }

    /// Whether holding `self` satisfies a requirement for `required`
    pub fn satisfies(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Manager, Role::Manager) => true,
            (Role::Manager, Role::Admin) => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            _ => Err(Error::InvalidParameter {
                name: "role".into(),
                reason: format!("unknown role: {}", s),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTHORIZATION CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller identity passed into every gated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    caller: Principal,
}

impl AuthorizationContext {
    /// Context for a call made by `caller`
    pub fn new(caller: impl Into<Principal>) -> Self {
        Self {
            caller: caller.into(),
        }
    }

    /// The calling principal
    pub fn caller(&self) -> &Principal {
        &self.caller
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCESS CONTROL
// ═══════════════════════════════════════════════════════════════════════════════

/// Role table owned by one oracle instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    grants: BTreeMap<Principal, BTreeSet<Role>>,
}

impl AccessControl {
    /// Create a role table whose only member is `admin`
    pub fn new(admin: impl Into<Principal>) -> Self {
        let mut grants = BTreeMap::new();
        grants.insert(admin.into(), BTreeSet::from([Role::Admin]));
        Self { grants }
    }

    /// Whether `principal` holds `role`, directly or through `Admin`
    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.grants
            .get(principal)
            .map(|roles| roles.iter().any(|held| held.satisfies(role)))
            .unwrap_or(false)
    }

    /// Gate: fail with `Unauthorized` unless the caller holds `role`
    pub fn require(&self, ctx: &AuthorizationContext, role: Role) -> Result<()> {
        if self.has_role(ctx.caller(), role) {
            return Ok(());
        }
        tracing::warn!(caller = %ctx.caller(), required = %role, "authorization denied");
        Err(Error::Unauthorized(format!(
            "{} does not hold the {} role",
            ctx.caller(),
            role
        )))
    }

    /// Grant `role` to `principal`. Admin only.
    ///
    /// Returns `false` if the principal already held the role directly.
    pub fn grant(
        &mut self,
        ctx: &AuthorizationContext,
        role: Role,
        principal: Principal,
    ) -> Result<bool> {
        self.require(ctx, Role::Admin)?;
        Ok(self.grants.entry(principal).or_default().insert(role))
    }

    /// Revoke `role` from `principal`. Admin only.
    ///
    /// Removing the last admin is rejected so the table can never lock itself.
    pub fn revoke(
        &mut self,
        ctx: &AuthorizationContext,
        role: Role,
        principal: &Principal,
    ) -> Result<bool> {
        self.require(ctx, Role::Admin)?;

        let holds = self
            .grants
            .get(principal)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false);
        if !holds {
            return Ok(false);
        }

        if role == Role::Admin && self.members(Role::Admin).len() == 1 {
            return Err(Error::InvalidParameter {
                name: "role".into(),
                reason: "cannot revoke the last admin".into(),
            });
        }

        if let Some(roles) = self.grants.get_mut(principal) {
            roles.remove(&role);
            if roles.is_empty() {
                self.grants.remove(principal);
            }
        }
        Ok(true)
    }

    /// Principals holding `role` directly
    pub fn members(&self, role: Role) -> Vec<&Principal> {
        self.grants
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(principal, _)| principal)
            .collect()
    }

    /// Roles held directly by `principal`
    pub fn roles_of(&self, principal: &Principal) -> Vec<Role> {
        self.grants
            .get(principal)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}
