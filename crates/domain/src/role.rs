use std::collections::BTreeMap;

use rolesync_core::{AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Container a role is defined in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoleScope {
    /// Role defined at realm level.
    Realm,
    /// Role defined under a registered client.
    Client {
        /// Internal identifier of the owning client (not the OAuth client id).
        client_id: NonEmptyString,
    },
}

/// A role resolved from the identity server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    id: NonEmptyString,
    name: String,
    scope: RoleScope,
}

impl RoleRef {
    /// Creates a role reference with an explicit scope.
    pub fn new(id: impl Into<String>, name: impl Into<String>, scope: RoleScope) -> AppResult<Self> {
        Ok(Self {
            id: NonEmptyString::new(id)?,
            name: name.into(),
            scope,
        })
    }

    /// Creates a realm-scoped role reference.
    pub fn realm(id: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        Self::new(id, name, RoleScope::Realm)
    }

    /// Creates a client-scoped role reference.
    pub fn client(
        id: impl Into<String>,
        name: impl Into<String>,
        client_id: impl Into<String>,
    ) -> AppResult<Self> {
        Self::new(
            id,
            name,
            RoleScope::Client {
                client_id: NonEmptyString::new(client_id)?,
            },
        )
    }

    /// Returns the stable role identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the human-readable role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the role scope.
    #[must_use]
    pub fn scope(&self) -> &RoleScope {
        &self.scope
    }

    /// Returns the owning client id for client roles.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        match &self.scope {
            RoleScope::Realm => None,
            RoleScope::Client { client_id } => Some(client_id.as_str()),
        }
    }

    /// Returns true for client-scoped roles.
    #[must_use]
    pub fn is_client_role(&self) -> bool {
        matches!(self.scope, RoleScope::Client { .. })
    }
}

/// Set of roles keyed by role id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleSet(BTreeMap<String, RoleRef>);

impl RoleSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a role. Returns false if a role with the same id was already present.
    pub fn insert(&mut self, role: RoleRef) -> bool {
        if self.0.contains_key(role.id()) {
            return false;
        }

        self.0.insert(role.id().to_owned(), role);
        true
    }

    /// Returns true when a role with the id is present.
    #[must_use]
    pub fn contains(&self, role_id: &str) -> bool {
        self.0.contains_key(role_id)
    }

    /// Looks up a role by id.
    #[must_use]
    pub fn get(&self, role_id: &str) -> Option<&RoleRef> {
        self.0.get(role_id)
    }

    /// Number of roles in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the set holds no role.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates roles in id order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleRef> {
        self.0.values()
    }

    /// Iterates role ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns `self \ other`, keyed by role id.
    #[must_use]
    pub fn difference(&self, other: &RoleSet) -> RoleSet {
        self.iter()
            .filter(|role| !other.contains(role.id()))
            .cloned()
            .collect()
    }

    /// Returns the roles as an owned list in id order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<RoleRef> {
        self.0.values().cloned().collect()
    }
}

impl FromIterator<RoleRef> for RoleSet {
    fn from_iter<T: IntoIterator<Item = RoleRef>>(iter: T) -> Self {
        let mut set = RoleSet::new();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl IntoIterator for RoleSet {
    type Item = RoleRef;
    type IntoIter = std::collections::btree_map::IntoValues<String, RoleRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = &'a RoleRef;
    type IntoIter = std::collections::btree_map::Values<'a, String, RoleRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}
