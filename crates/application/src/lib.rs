//! Application services and ports.

#![forbid(unsafe_code)]

mod reconcile_error;
mod role_mapping_ports;
mod role_mapping_reconciler;
mod role_mapping_service;

#[cfg(test)]
mod test_support;

pub use reconcile_error::{GatewayOperation, ReconcileError};
pub use role_mapping_ports::{RoleAssignmentGateway, RoleLookup, RoleMappingReader};
pub use role_mapping_reconciler::{ApplyReport, RoleMappingReconciler};
pub use role_mapping_service::{AppliedRoleMapping, ReconcileRequest, RoleMappingService};
