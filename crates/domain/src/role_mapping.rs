//! Role assignments of one principal, partitioned by scope, and the delta
//! between two such snapshots.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::role::{RoleRef, RoleScope, RoleSet};

/// Role assignments of one principal, split into realm roles and roles per client.
///
/// A role id appears at most once across all buckets, and client buckets are
/// never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMapping {
    realm_roles: RoleSet,
    client_roles: BTreeMap<String, RoleSet>,
}

impl RoleMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions roles into realm and client buckets. Later duplicates of an id are ignored.
    pub fn from_roles(roles: impl IntoIterator<Item = RoleRef>) -> Self {
        let mut mapping = Self::new();
        for role in roles {
            mapping.insert(role);
        }
        mapping
    }

    /// Inserts a role into the bucket of its scope. Returns false if the id is already mapped.
    pub fn insert(&mut self, role: RoleRef) -> bool {
        if self.contains(role.id()) {
            return false;
        }

        match role.scope().clone() {
            RoleScope::Realm => self.realm_roles.insert(role),
            RoleScope::Client { client_id } => self
                .client_roles
                .entry(client_id.into())
                .or_default()
                .insert(role),
        }
    }

    /// Returns the realm-scoped roles.
    #[must_use]
    pub fn realm_roles(&self) -> &RoleSet {
        &self.realm_roles
    }

    /// Returns client-scoped roles keyed by internal client id.
    #[must_use]
    pub fn client_roles(&self) -> &BTreeMap<String, RoleSet> {
        &self.client_roles
    }

    /// Returns true when any bucket holds the role id.
    #[must_use]
    pub fn contains(&self, role_id: &str) -> bool {
        self.realm_roles.contains(role_id)
            || self
                .client_roles
                .values()
                .any(|roles| roles.contains(role_id))
    }

    /// Iterates realm roles first, then client roles by ascending client id.
    pub fn roles(&self) -> impl Iterator<Item = &RoleRef> {
        self.realm_roles
            .iter()
            .chain(self.client_roles.values().flat_map(RoleSet::iter))
    }

    /// Returns all role ids, realm roles first.
    #[must_use]
    pub fn role_ids(&self) -> Vec<String> {
        self.roles().map(|role| role.id().to_owned()).collect()
    }

    /// Total number of mapped roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.realm_roles.len() + self.client_roles.values().map(RoleSet::len).sum::<usize>()
    }

    /// Returns true when nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.realm_roles.is_empty() && self.client_roles.is_empty()
    }

    /// Computes the changes that turn `existing` into `self`.
    ///
    /// Clients present only in `self` are added in full, clients present only
    /// in `existing` are removed in full.
    #[must_use]
    pub fn diff(&self, existing: &RoleMapping) -> RoleMappingDelta {
        let mut delta = RoleMappingDelta {
            realm_roles_to_add: self.realm_roles.difference(&existing.realm_roles),
            realm_roles_to_remove: existing.realm_roles.difference(&self.realm_roles),
            ..RoleMappingDelta::default()
        };

        for (client_id, desired_roles) in &self.client_roles {
            match existing.client_roles.get(client_id) {
                Some(existing_roles) => {
                    delta.push_client_add(client_id, desired_roles.difference(existing_roles));
                    delta.push_client_remove(client_id, existing_roles.difference(desired_roles));
                }
                None => delta.push_client_add(client_id, desired_roles.clone()),
            }
        }

        for (client_id, existing_roles) in &existing.client_roles {
            if !self.client_roles.contains_key(client_id) {
                delta.push_client_remove(client_id, existing_roles.clone());
            }
        }

        delta
    }
}

/// Role assignments to add and remove for one principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMappingDelta {
    realm_roles_to_add: RoleSet,
    realm_roles_to_remove: RoleSet,
    client_roles_to_add: BTreeMap<String, RoleSet>,
    client_roles_to_remove: BTreeMap<String, RoleSet>,
}

impl RoleMappingDelta {
    /// Creates a delta that removes every role of the mapping and adds nothing.
    #[must_use]
    pub fn removing(mapping: RoleMapping) -> Self {
        Self {
            realm_roles_to_remove: mapping.realm_roles,
            client_roles_to_remove: mapping.client_roles,
            ..Self::default()
        }
    }

    /// Drops every removal, keeping only additions.
    #[must_use]
    pub fn without_removals(self) -> Self {
        Self {
            realm_roles_to_add: self.realm_roles_to_add,
            client_roles_to_add: self.client_roles_to_add,
            ..Self::default()
        }
    }

    /// Adds roles to the removal side. Roles already scheduled for addition are skipped.
    #[must_use]
    pub fn with_removals(mut self, roles: impl IntoIterator<Item = RoleRef>) -> Self {
        for role in roles {
            let added = match role.client_id() {
                None => self.realm_roles_to_add.contains(role.id()),
                Some(client_id) => self
                    .client_roles_to_add
                    .get(client_id)
                    .is_some_and(|added| added.contains(role.id())),
            };
            if added {
                continue;
            }

            match role.client_id().map(str::to_owned) {
                None => {
                    self.realm_roles_to_remove.insert(role);
                }
                Some(client_id) => {
                    self.client_roles_to_remove
                        .entry(client_id)
                        .or_default()
                        .insert(role);
                }
            }
        }
        self
    }

    /// Realm roles missing from the existing mapping.
    #[must_use]
    pub fn realm_roles_to_add(&self) -> &RoleSet {
        &self.realm_roles_to_add
    }

    /// Realm roles present only in the existing mapping.
    #[must_use]
    pub fn realm_roles_to_remove(&self) -> &RoleSet {
        &self.realm_roles_to_remove
    }

    /// Client roles to add, keyed by internal client id.
    #[must_use]
    pub fn client_roles_to_add(&self) -> &BTreeMap<String, RoleSet> {
        &self.client_roles_to_add
    }

    /// Client roles to remove, keyed by internal client id.
    #[must_use]
    pub fn client_roles_to_remove(&self) -> &BTreeMap<String, RoleSet> {
        &self.client_roles_to_remove
    }

    /// Returns true when at least one role would be added.
    #[must_use]
    pub fn has_additions(&self) -> bool {
        !self.realm_roles_to_add.is_empty() || !self.client_roles_to_add.is_empty()
    }

    /// Returns true when at least one role would be removed.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        !self.realm_roles_to_remove.is_empty() || !self.client_roles_to_remove.is_empty()
    }

    /// Returns true when the delta holds no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_additions() && !self.has_removals()
    }

    /// Ids of every role to add, realm roles first.
    #[must_use]
    pub fn added_role_ids(&self) -> Vec<String> {
        collect_ids(&self.realm_roles_to_add, &self.client_roles_to_add)
    }

    /// Ids of every role to remove, realm roles first.
    #[must_use]
    pub fn removed_role_ids(&self) -> Vec<String> {
        collect_ids(&self.realm_roles_to_remove, &self.client_roles_to_remove)
    }

    fn push_client_add(&mut self, client_id: &str, roles: RoleSet) {
        if !roles.is_empty() {
            self.client_roles_to_add.insert(client_id.to_owned(), roles);
        }
    }

    fn push_client_remove(&mut self, client_id: &str, roles: RoleSet) {
        if !roles.is_empty() {
            self.client_roles_to_remove
                .insert(client_id.to_owned(), roles);
        }
    }
}

fn collect_ids(realm_roles: &RoleSet, client_roles: &BTreeMap<String, RoleSet>) -> Vec<String> {
    realm_roles
        .ids()
        .chain(client_roles.values().flat_map(RoleSet::ids))
        .map(str::to_owned)
        .collect()
}

impl Display for RoleMappingDelta {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(formatter, "no changes");
        }

        for role in &self.realm_roles_to_add {
            writeln!(formatter, "+ realm role {} ({})", role.name(), role.id())?;
        }
        for (client_id, roles) in &self.client_roles_to_add {
            for role in roles {
                writeln!(
                    formatter,
                    "+ client {client_id} role {} ({})",
                    role.name(),
                    role.id()
                )?;
            }
        }
        for role in &self.realm_roles_to_remove {
            writeln!(formatter, "- realm role {} ({})", role.name(), role.id())?;
        }
        for (client_id, roles) in &self.client_roles_to_remove {
            for role in roles {
                writeln!(
                    formatter,
                    "- client {client_id} role {} ({})",
                    role.name(),
                    role.id()
                )?;
            }
        }

        Ok(())
    }
}
