//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod principal;
mod role;
mod role_mapping;

pub use principal::{Principal, PrincipalKind, RoleMappingTarget};
pub use role::{RoleRef, RoleScope, RoleSet};
pub use role_mapping::{RoleMapping, RoleMappingDelta};
