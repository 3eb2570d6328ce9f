use std::collections::HashSet;
use std::sync::Arc;

use rolesync_domain::{RoleMapping, RoleMappingDelta, RoleMappingTarget, RoleSet};
use tracing::{debug, info};

use crate::{GatewayOperation, ReconcileError, RoleAssignmentGateway, RoleLookup};

/// Summary of the gateway calls issued by one apply pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Number of gateway calls issued.
    pub calls: usize,
    /// Number of role assignments added.
    pub roles_added: usize,
    /// Number of role assignments removed.
    pub roles_removed: usize,
    /// Number of removals left in place because the pass was additive.
    pub removals_skipped: usize,
}

/// Resolves desired roles, diffs them against existing assignments and applies the delta.
///
/// Holds no state between calls. Concurrent passes over the same principal
/// race: the existing snapshot can be stale by the time the delta is applied.
#[derive(Clone)]
pub struct RoleMappingReconciler {
    lookup: Arc<dyn RoleLookup>,
    gateway: Arc<dyn RoleAssignmentGateway>,
}

impl RoleMappingReconciler {
    /// Creates a reconciler from its collaborators.
    #[must_use]
    pub fn new(lookup: Arc<dyn RoleLookup>, gateway: Arc<dyn RoleAssignmentGateway>) -> Self {
        Self { lookup, gateway }
    }

    /// Resolves role ids into a partitioned mapping.
    ///
    /// Duplicate ids are looked up once. The first failing lookup aborts the
    /// whole resolution.
    pub async fn resolve(
        &self,
        realm_id: &str,
        role_ids: &[String],
    ) -> Result<RoleMapping, ReconcileError> {
        let mut seen = HashSet::new();
        let mut mapping = RoleMapping::new();

        for role_id in role_ids {
            if !seen.insert(role_id.as_str()) {
                continue;
            }

            let role = self
                .lookup
                .get_role(realm_id, role_id)
                .await
                .map_err(|source| ReconcileError::Lookup {
                    role_id: role_id.clone(),
                    source,
                })?;
            mapping.insert(role);
        }

        debug!(realm_id, resolved = mapping.len(), "resolved desired roles");
        Ok(mapping)
    }

    /// Computes the delta turning `existing` into `desired`.
    #[must_use]
    pub fn diff(&self, desired: &RoleMapping, existing: &RoleMapping) -> RoleMappingDelta {
        desired.diff(existing)
    }

    /// Applies a delta: realm additions, client additions, then removals when `exhaustive`.
    ///
    /// Stops at the first failing call without undoing earlier calls.
    pub async fn apply(
        &self,
        target: &RoleMappingTarget,
        delta: &RoleMappingDelta,
        exhaustive: bool,
    ) -> Result<ApplyReport, ReconcileError> {
        let mut report = ApplyReport::default();
        let realm_id = target.realm_id();
        let principal = target.principal();

        if !delta.realm_roles_to_add().is_empty() {
            let roles = delta.realm_roles_to_add().to_vec();
            debug!(%target, count = roles.len(), "adding realm roles");
            self.gateway
                .add_realm_roles(realm_id, principal, &roles)
                .await
                .map_err(|source| ReconcileError::Gateway {
                    operation: GatewayOperation::AddRealmRoles,
                    source,
                })?;
            report.record(&roles, true);
        }

        for (client_id, roles) in non_empty(delta.client_roles_to_add()) {
            let roles = roles.to_vec();
            debug!(%target, client_id, count = roles.len(), "adding client roles");
            self.gateway
                .add_client_roles(realm_id, principal, client_id, &roles)
                .await
                .map_err(|source| ReconcileError::Gateway {
                    operation: GatewayOperation::AddClientRoles {
                        client_id: client_id.to_owned(),
                    },
                    source,
                })?;
            report.record(&roles, true);
        }

        if !exhaustive {
            report.removals_skipped = delta.removed_role_ids().len();
            if report.removals_skipped > 0 {
                info!(
                    %target,
                    skipped = report.removals_skipped,
                    "additive mode keeps role assignments not in the desired set"
                );
            }
            return Ok(report);
        }

        if !delta.realm_roles_to_remove().is_empty() {
            let roles = delta.realm_roles_to_remove().to_vec();
            debug!(%target, count = roles.len(), "removing realm roles");
            self.gateway
                .remove_realm_roles(realm_id, principal, &roles)
                .await
                .map_err(|source| ReconcileError::Gateway {
                    operation: GatewayOperation::RemoveRealmRoles,
                    source,
                })?;
            report.record(&roles, false);
        }

        for (client_id, roles) in non_empty(delta.client_roles_to_remove()) {
            let roles = roles.to_vec();
            debug!(%target, client_id, count = roles.len(), "removing client roles");
            self.gateway
                .remove_client_roles(realm_id, principal, client_id, &roles)
                .await
                .map_err(|source| ReconcileError::Gateway {
                    operation: GatewayOperation::RemoveClientRoles {
                        client_id: client_id.to_owned(),
                    },
                    source,
                })?;
            report.record(&roles, false);
        }

        Ok(report)
    }
}

impl ApplyReport {
    fn record<T>(&mut self, roles: &[T], added: bool) {
        self.calls += 1;
        if added {
            self.roles_added += roles.len();
        } else {
            self.roles_removed += roles.len();
        }
    }
}

fn non_empty(
    buckets: &std::collections::BTreeMap<String, RoleSet>,
) -> impl Iterator<Item = (&str, &RoleSet)> {
    buckets
        .iter()
        .filter(|(_, roles)| !roles.is_empty())
        .map(|(client_id, roles)| (client_id.as_str(), roles))
}
