use std::collections::HashMap;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{RoleMapping, RoleRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(super) struct AccessTokenResponse {
    pub(super) access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RoleRepresentation {
    pub(super) id: String,
    pub(super) name: String,
    #[serde(default)]
    pub(super) client_role: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) container_id: Option<String>,
}

impl RoleRepresentation {
    pub(super) fn into_role(self) -> AppResult<RoleRef> {
        if !self.client_role {
            return RoleRef::realm(self.id, self.name);
        }

        let client_id = self.container_id.ok_or_else(|| {
            AppError::Internal(format!(
                "client role '{}' is missing its container id",
                self.id
            ))
        })?;
        RoleRef::client(self.id, self.name, client_id)
    }
}

impl From<&RoleRef> for RoleRepresentation {
    fn from(role: &RoleRef) -> Self {
        Self {
            id: role.id().to_owned(),
            name: role.name().to_owned(),
            client_role: role.is_client_role(),
            container_id: role.client_id().map(str::to_owned),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MappingsRepresentation {
    #[serde(default)]
    realm_mappings: Vec<RoleRepresentation>,
    #[serde(default)]
    client_mappings: HashMap<String, ClientMappingsRepresentation>,
}

#[derive(Debug, Deserialize)]
struct ClientMappingsRepresentation {
    id: String,
    #[serde(default)]
    mappings: Vec<RoleRepresentation>,
}

impl MappingsRepresentation {
    /// Client roles take the bucket's client id, whatever their own container id says.
    pub(super) fn into_mapping(self) -> AppResult<RoleMapping> {
        let mut mapping = RoleMapping::new();

        for role in self.realm_mappings {
            mapping.insert(RoleRef::realm(role.id, role.name)?);
        }

        for client in self.client_mappings.into_values() {
            for role in client.mappings {
                mapping.insert(RoleRef::client(role.id, role.name, client.id.as_str())?);
            }
        }

        Ok(mapping)
    }
}
