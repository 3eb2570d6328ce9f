use async_trait::async_trait;

use rolesync_core::AppResult;
use rolesync_domain::{Principal, RoleMapping, RoleRef};

/// Port resolving role identifiers into scoped role records.
#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// Resolves one role by id. Returns `AppError::NotFound` when the realm has no such role.
    async fn get_role(&self, realm_id: &str, role_id: &str) -> AppResult<RoleRef>;
}

/// Port performing role assignment changes on the identity server.
///
/// Each call succeeds or fails as a unit.
#[async_trait]
pub trait RoleAssignmentGateway: Send + Sync {
    /// Assigns realm roles to a principal.
    async fn add_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()>;

    /// Removes realm role assignments from a principal.
    async fn remove_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()>;

    /// Assigns roles of one client to a principal.
    async fn add_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()>;

    /// Removes role assignments of one client from a principal.
    async fn remove_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()>;
}

/// Port reading the live role mapping of a principal.
#[async_trait]
pub trait RoleMappingReader: Send + Sync {
    /// Fetches every role currently assigned to the principal.
    ///
    /// Returns `AppError::NotFound` when the principal does not exist.
    async fn get_role_mapping(&self, realm_id: &str, principal: &Principal)
    -> AppResult<RoleMapping>;
}
