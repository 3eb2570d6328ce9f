use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolesync_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Kind of principal whose role assignments are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A realm user.
    User,
    /// A realm group.
    Group,
}

impl PrincipalKind {
    /// Returns a stable transport value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// Returns the admin API collection segment for this kind.
    #[must_use]
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Group => "groups",
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(Self::User),
            "group" | "groups" => Ok(Self::Group),
            _ => Err(AppError::Validation(format!(
                "unknown principal kind '{value}'"
            ))),
        }
    }
}

/// A user or group holding role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// A realm user.
    User(NonEmptyString),
    /// A realm group.
    Group(NonEmptyString),
}

impl Principal {
    /// Creates a validated principal.
    pub fn new(kind: PrincipalKind, id: impl Into<String>) -> AppResult<Self> {
        let id = NonEmptyString::new(id)?;
        Ok(match kind {
            PrincipalKind::User => Self::User(id),
            PrincipalKind::Group => Self::Group(id),
        })
    }

    /// Returns the principal kind.
    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::Group(_) => PrincipalKind::Group,
        }
    }

    /// Returns the principal identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id.as_str(),
        }
    }
}

/// Parses `user:<id>` or `group:<id>`.
impl FromStr for Principal {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = value.split_once(':').ok_or_else(|| {
            AppError::Validation(format!(
                "principal '{value}' must look like 'user:<id>' or 'group:<id>'"
            ))
        })?;

        Self::new(kind.parse()?, id.trim())
    }
}

impl Display for Principal {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// The realm and principal a role mapping belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleMappingTarget {
    realm_id: NonEmptyString,
    principal: Principal,
}

impl RoleMappingTarget {
    /// Creates a validated target.
    pub fn new(realm_id: impl Into<String>, principal: Principal) -> AppResult<Self> {
        Ok(Self {
            realm_id: NonEmptyString::new(realm_id)?,
            principal,
        })
    }

    /// Parses a `{realm}/{principalId}` resource id for the given principal kind.
    pub fn parse_import_id(kind: PrincipalKind, value: &str) -> AppResult<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        let invalid = || {
            let id_name = match kind {
                PrincipalKind::User => "userId",
                PrincipalKind::Group => "groupId",
            };
            AppError::Validation(format!(
                "invalid import id '{value}', supported import format: {{realm}}/{{{id_name}}}"
            ))
        };

        if parts.len() != 2 {
            return Err(invalid());
        }

        let principal = Principal::new(kind, parts[1]).map_err(|_| invalid())?;
        Self::new(parts[0], principal).map_err(|_| invalid())
    }

    /// Returns the realm the principal lives in.
    #[must_use]
    pub fn realm_id(&self) -> &str {
        self.realm_id.as_str()
    }

    /// Returns the principal.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the `{realm}/{principalId}` resource id.
    #[must_use]
    pub fn resource_id(&self) -> String {
        format!("{}/{}", self.realm_id, self.principal.id())
    }
}

impl Display for RoleMappingTarget {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.realm_id, self.principal)
    }
}
