use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{Principal, RoleMapping, RoleMappingTarget, RoleRef};

use crate::{RoleAssignmentGateway, RoleLookup, RoleMappingReader};

/// Identity server stand-in that records every call.
#[derive(Default)]
pub(crate) struct FakeDirectory {
    roles: HashMap<String, RoleRef>,
    assignments: Mutex<HashMap<(String, Principal), RoleMapping>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) lookups: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl FakeDirectory {
    pub(crate) fn with_roles(roles: Vec<RoleRef>) -> Self {
        Self {
            roles: roles
                .into_iter()
                .map(|role| (role.id().to_owned(), role))
                .collect(),
            ..Self::default()
        }
    }

    /// Makes the call whose recorded label starts with `label` fail.
    pub(crate) fn failing_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_owned());
        self
    }

    pub(crate) async fn assign(&self, target: &RoleMappingTarget, role_ids: &[&str]) {
        let roles = role_ids
            .iter()
            .filter_map(|role_id| self.roles.get(*role_id).cloned());
        self.assignments.lock().await.insert(
            key(target.realm_id(), target.principal()),
            RoleMapping::from_roles(roles),
        );
    }

    pub(crate) async fn assigned_ids(&self, target: &RoleMappingTarget) -> Vec<String> {
        self.assignments
            .lock()
            .await
            .get(&key(target.realm_id(), target.principal()))
            .map(RoleMapping::role_ids)
            .unwrap_or_default()
    }

    pub(crate) async fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, label: String) -> AppResult<()> {
        let failing = self
            .fail_on
            .as_deref()
            .is_some_and(|prefix| label.starts_with(prefix));
        self.calls.lock().await.push(label.clone());
        if failing {
            return Err(AppError::Internal(format!("injected failure on {label}")));
        }
        Ok(())
    }

    async fn change(&self, realm_id: &str, principal: &Principal, roles: &[RoleRef], add: bool) {
        let mut assignments = self.assignments.lock().await;
        let current = assignments
            .entry(key(realm_id, principal))
            .or_default();
        let next = if add {
            RoleMapping::from_roles(current.roles().cloned().chain(roles.iter().cloned()))
        } else {
            RoleMapping::from_roles(
                current
                    .roles()
                    .filter(|role| roles.iter().all(|removed| removed.id() != role.id()))
                    .cloned(),
            )
        };
        *current = next;
    }
}

fn key(realm_id: &str, principal: &Principal) -> (String, Principal) {
    (realm_id.to_owned(), principal.clone())
}

fn ids(roles: &[RoleRef]) -> String {
    roles
        .iter()
        .map(RoleRef::id)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl RoleLookup for FakeDirectory {
    async fn get_role(&self, _realm_id: &str, role_id: &str) -> AppResult<RoleRef> {
        self.lookups.lock().await.push(role_id.to_owned());
        self.roles
            .get(role_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}'")))
    }
}

#[async_trait]
impl RoleAssignmentGateway for FakeDirectory {
    async fn add_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.record(format!("add_realm:{}", ids(roles))).await?;
        self.change(realm_id, principal, roles, true).await;
        Ok(())
    }

    async fn remove_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.record(format!("remove_realm:{}", ids(roles))).await?;
        self.change(realm_id, principal, roles, false).await;
        Ok(())
    }

    async fn add_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.record(format!("add_client:{client_id}:{}", ids(roles)))
            .await?;
        self.change(realm_id, principal, roles, true).await;
        Ok(())
    }

    async fn remove_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.record(format!("remove_client:{client_id}:{}", ids(roles)))
            .await?;
        self.change(realm_id, principal, roles, false).await;
        Ok(())
    }
}

#[async_trait]
impl RoleMappingReader for FakeDirectory {
    async fn get_role_mapping(
        &self,
        realm_id: &str,
        principal: &Principal,
    ) -> AppResult<RoleMapping> {
        self.assignments
            .lock()
            .await
            .get(&key(realm_id, principal))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("principal '{principal}'")))
    }
}

pub(crate) fn realm_role(id: &str) -> RoleRef {
    RoleRef::realm(id, id).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn client_role(client_id: &str, id: &str) -> RoleRef {
    RoleRef::client(id, id, client_id).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn user_target(realm_id: &str, user_id: &str) -> RoleMappingTarget {
    Principal::new(rolesync_domain::PrincipalKind::User, user_id)
        .and_then(|principal| RoleMappingTarget::new(realm_id, principal))
        .unwrap_or_else(|_| unreachable!())
}

pub(crate) fn role_ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}
