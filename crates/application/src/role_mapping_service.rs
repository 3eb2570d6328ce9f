use std::collections::HashSet;
use std::sync::Arc;

use rolesync_core::AppError;
use rolesync_domain::{RoleMapping, RoleMappingDelta, RoleMappingTarget};
use tracing::{info, warn};

use crate::{ApplyReport, ReconcileError, RoleMappingReader, RoleMappingReconciler};

/// Input for converging a principal's role assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    /// Realm and principal to converge.
    pub target: RoleMappingTarget,
    /// Role ids the principal should hold.
    pub role_ids: Vec<String>,
    /// Role ids recorded by the previous successful pass, if any.
    pub previous_role_ids: Option<Vec<String>>,
    /// Removes roles outside `role_ids` when true; only adds when false.
    pub exhaustive: bool,
}

/// Role ids to persist for a principal after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRoleMapping {
    /// `{realm}/{principalId}` resource id.
    pub id: String,
    /// Realm and principal the ids belong to.
    pub target: RoleMappingTarget,
    /// Assigned role ids, realm roles first.
    pub role_ids: Vec<String>,
    /// Mode the ids were read in.
    pub exhaustive: bool,
}

impl AppliedRoleMapping {
    fn new(target: RoleMappingTarget, role_ids: Vec<String>, exhaustive: bool) -> Self {
        Self {
            id: target.resource_id(),
            target,
            role_ids,
            exhaustive,
        }
    }
}

/// Resource lifecycle around the reconciler: reconcile, read, plan, import and delete.
#[derive(Clone)]
pub struct RoleMappingService {
    reconciler: RoleMappingReconciler,
    reader: Arc<dyn RoleMappingReader>,
}

impl RoleMappingService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(reconciler: RoleMappingReconciler, reader: Arc<dyn RoleMappingReader>) -> Self {
        Self { reconciler, reader }
    }

    /// Converges the principal to the requested roles and returns the ids to persist.
    ///
    /// Role ids dropped since `previous_role_ids` are removed first, in both modes.
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
    ) -> Result<AppliedRoleMapping, ReconcileError> {
        let ReconcileRequest {
            target,
            role_ids,
            previous_role_ids,
            exhaustive,
        } = request;

        let dropped = dropped_role_ids(&role_ids, previous_role_ids.as_deref());
        if !dropped.is_empty() {
            let mapping = self
                .reconciler
                .resolve(target.realm_id(), &dropped)
                .await?;
            self.reconciler
                .apply(&target, &RoleMappingDelta::removing(mapping), true)
                .await?;
        }

        let desired = self.reconciler.resolve(target.realm_id(), &role_ids).await?;
        let existing = self.existing(&target).await?;
        let delta = self.reconciler.diff(&desired, &existing);
        let report = self.reconciler.apply(&target, &delta, exhaustive).await?;

        info!(
            %target,
            exhaustive,
            added = report.roles_added,
            removed = report.roles_removed,
            skipped = report.removals_skipped,
            "role mapping reconciled"
        );

        self.read(&target, &role_ids, exhaustive)
            .await?
            .ok_or_else(|| ReconcileError::ExistingState {
                source: AppError::NotFound(format!("{target} disappeared during reconciliation")),
            })
    }

    /// Reads the role ids to persist.
    ///
    /// Exhaustive reads return every assigned role; additive reads only the
    /// assigned roles that are also configured. Returns `None` when the
    /// principal no longer exists.
    pub async fn read(
        &self,
        target: &RoleMappingTarget,
        configured_role_ids: &[String],
        exhaustive: bool,
    ) -> Result<Option<AppliedRoleMapping>, ReconcileError> {
        let existing = match self.existing(target).await {
            Ok(existing) => existing,
            Err(error) if error.is_not_found() => {
                warn!(%target, "principal not found, dropping role mapping");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        let configured: HashSet<&str> = configured_role_ids.iter().map(String::as_str).collect();
        let role_ids = existing
            .role_ids()
            .into_iter()
            .filter(|role_id| exhaustive || configured.contains(role_id.as_str()))
            .collect();

        Ok(Some(AppliedRoleMapping::new(target.clone(), role_ids, exhaustive)))
    }

    /// Computes the changes `reconcile` would make for the request, without side effects.
    ///
    /// Additive requests show no removals except the assigned roles dropped
    /// since `previous_role_ids`.
    pub async fn plan(
        &self,
        request: &ReconcileRequest,
    ) -> Result<RoleMappingDelta, ReconcileError> {
        let target = &request.target;
        let desired = self
            .reconciler
            .resolve(target.realm_id(), &request.role_ids)
            .await?;
        let dropped_ids = dropped_role_ids(&request.role_ids, request.previous_role_ids.as_deref());
        let dropped = self.reconciler.resolve(target.realm_id(), &dropped_ids).await?;
        let existing = self.existing(target).await?;

        let delta = self.reconciler.diff(&desired, &existing);
        let delta = if request.exhaustive {
            delta
        } else {
            delta.without_removals()
        };

        Ok(delta.with_removals(
            dropped
                .roles()
                .filter(|role| existing.contains(role.id()))
                .cloned(),
        ))
    }

    /// Adopts the live role mapping of an existing principal in exhaustive mode.
    pub async fn import(
        &self,
        target: &RoleMappingTarget,
    ) -> Result<AppliedRoleMapping, ReconcileError> {
        self.read(target, &[], true)
            .await?
            .ok_or_else(|| ReconcileError::ExistingState {
                source: AppError::NotFound(format!("cannot import {target}: principal not found")),
            })
    }

    /// Removes exactly the configured roles from the principal.
    pub async fn delete(
        &self,
        target: &RoleMappingTarget,
        configured_role_ids: &[String],
    ) -> Result<ApplyReport, ReconcileError> {
        let mapping = self
            .reconciler
            .resolve(target.realm_id(), configured_role_ids)
            .await?;
        let report = self
            .reconciler
            .apply(target, &RoleMappingDelta::removing(mapping), true)
            .await?;

        info!(%target, removed = report.roles_removed, "role mapping deleted");
        Ok(report)
    }

    async fn existing(&self, target: &RoleMappingTarget) -> Result<RoleMapping, ReconcileError> {
        self.reader
            .get_role_mapping(target.realm_id(), target.principal())
            .await
            .map_err(|source| ReconcileError::ExistingState { source })
    }
}

/// Ids recorded by the previous pass that are no longer desired.
fn dropped_role_ids(role_ids: &[String], previous_role_ids: Option<&[String]>) -> Vec<String> {
    let desired: HashSet<&str> = role_ids.iter().map(String::as_str).collect();
    previous_role_ids
        .unwrap_or_default()
        .iter()
        .filter(|role_id| !desired.contains(role_id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests;
