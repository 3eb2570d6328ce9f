//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_role_directory;
mod keycloak_admin_client;

pub use in_memory_role_directory::InMemoryRoleDirectory;
pub use keycloak_admin_client::{KeycloakAdminClient, KeycloakClientConfig, KeycloakCredentials};
