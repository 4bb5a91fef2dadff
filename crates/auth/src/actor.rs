use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use invoicer_core::{TenantId, UserId};

use crate::Role;

/// The authenticated caller of an operation.
///
/// Resolved by the transport layer before any core logic runs and passed
/// explicitly into every policy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// Whether the actor's tenant is a platform-admin tenant.
    pub tenant_is_admin: bool,
    pub roles: BTreeSet<Role>,
    pub is_active: bool,
}

impl Actor {
    pub fn has_role(&self, role: Role) -> bool {
        role == Role::User || self.roles.contains(&role)
    }

    /// Holds `ROLE_ADMIN`.
    pub fn is_admin_user(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Admin user inside an admin tenant: may write anywhere.
    pub fn is_platform_admin(&self) -> bool {
        self.tenant_is_admin && self.is_admin_user()
    }
}
