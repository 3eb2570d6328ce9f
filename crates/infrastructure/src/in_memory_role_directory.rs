use std::collections::HashMap;

use async_trait::async_trait;
use rolesync_application::{RoleAssignmentGateway, RoleLookup, RoleMappingReader};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{Principal, RoleMapping, RoleRef};
use tokio::sync::RwLock;

/// In-memory identity directory holding role definitions and assignments per realm.
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    roles: RwLock<HashMap<(String, String), RoleRef>>,
    assignments: RwLock<HashMap<(String, Principal), RoleMapping>>,
}

impl InMemoryRoleDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a role in a realm.
    pub async fn define_role(&self, realm_id: &str, role: RoleRef) -> AppResult<()> {
        let key = (realm_id.to_owned(), role.id().to_owned());
        let mut roles = self.roles.write().await;

        if roles.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists in realm '{realm_id}'",
                key.1
            )));
        }

        roles.insert(key, role);
        Ok(())
    }

    /// Registers a principal with no role assignments. Existing principals are left untouched.
    pub async fn register_principal(&self, realm_id: &str, principal: Principal) {
        self.assignments
            .write()
            .await
            .entry((realm_id.to_owned(), principal))
            .or_default();
    }

    /// Removes a principal together with its assignments.
    pub async fn remove_principal(&self, realm_id: &str, principal: &Principal) -> AppResult<()> {
        self.assignments
            .write()
            .await
            .remove(&(realm_id.to_owned(), principal.clone()))
            .map(|_| ())
            .ok_or_else(|| not_found(realm_id, principal))
    }

    async fn ensure_defined(&self, realm_id: &str, roles: &[RoleRef]) -> AppResult<()> {
        let defined = self.roles.read().await;

        for role in roles {
            match defined.get(&(realm_id.to_owned(), role.id().to_owned())) {
                Some(stored) if stored.scope() == role.scope() => {}
                Some(_) => {
                    return Err(AppError::Validation(format!(
                        "role '{}' does not belong to the requested container",
                        role.id()
                    )));
                }
                None => {
                    return Err(AppError::NotFound(format!(
                        "role '{}' in realm '{realm_id}'",
                        role.id()
                    )));
                }
            }
        }

        Ok(())
    }

    async fn add(&self, realm_id: &str, principal: &Principal, roles: &[RoleRef]) -> AppResult<()> {
        self.ensure_defined(realm_id, roles).await?;

        let mut assignments = self.assignments.write().await;
        let mapping = assignments
            .get_mut(&(realm_id.to_owned(), principal.clone()))
            .ok_or_else(|| not_found(realm_id, principal))?;

        for role in roles {
            mapping.insert(role.clone());
        }
        Ok(())
    }

    async fn remove(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        let mut assignments = self.assignments.write().await;
        let mapping = assignments
            .get_mut(&(realm_id.to_owned(), principal.clone()))
            .ok_or_else(|| not_found(realm_id, principal))?;

        *mapping = RoleMapping::from_roles(
            mapping
                .roles()
                .filter(|assigned| roles.iter().all(|role| role.id() != assigned.id()))
                .cloned(),
        );
        Ok(())
    }
}

fn not_found(realm_id: &str, principal: &Principal) -> AppError {
    AppError::NotFound(format!("{principal} in realm '{realm_id}'"))
}

fn ensure_client(client_id: &str, roles: &[RoleRef]) -> AppResult<()> {
    match roles.iter().find(|role| role.client_id() != Some(client_id)) {
        Some(role) => Err(AppError::Validation(format!(
            "role '{}' is not a role of client '{client_id}'",
            role.id()
        ))),
        None => Ok(()),
    }
}

fn ensure_realm(roles: &[RoleRef]) -> AppResult<()> {
    match roles.iter().find(|role| role.is_client_role()) {
        Some(role) => Err(AppError::Validation(format!(
            "role '{}' is not a realm role",
            role.id()
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl RoleLookup for InMemoryRoleDirectory {
    async fn get_role(&self, realm_id: &str, role_id: &str) -> AppResult<RoleRef> {
        self.roles
            .read()
            .await
            .get(&(realm_id.to_owned(), role_id.to_owned()))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' in realm '{realm_id}'")))
    }
}

#[async_trait]
impl RoleAssignmentGateway for InMemoryRoleDirectory {
    async fn add_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        ensure_realm(roles)?;
        self.add(realm_id, principal, roles).await
    }

    async fn remove_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        ensure_realm(roles)?;
        self.remove(realm_id, principal, roles).await
    }

    async fn add_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        ensure_client(client_id, roles)?;
        self.add(realm_id, principal, roles).await
    }

    async fn remove_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        ensure_client(client_id, roles)?;
        self.remove(realm_id, principal, roles).await
    }
}

#[async_trait]
impl RoleMappingReader for InMemoryRoleDirectory {
    async fn get_role_mapping(
        &self,
        realm_id: &str,
        principal: &Principal,
    ) -> AppResult<RoleMapping> {
        self.assignments
            .read()
            .await
            .get(&(realm_id.to_owned(), principal.clone()))
            .cloned()
            .ok_or_else(|| not_found(realm_id, principal))
    }
}

#[cfg(test)]
mod tests;
