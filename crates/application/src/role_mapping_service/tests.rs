use std::sync::Arc;

use rolesync_core::AppError;

use crate::test_support::{FakeDirectory, client_role, realm_role, role_ids, user_target};
use crate::{ReconcileError, ReconcileRequest, RoleMappingReconciler};

use super::RoleMappingService;

fn service(directory: &Arc<FakeDirectory>) -> RoleMappingService {
    RoleMappingService::new(
        RoleMappingReconciler::new(directory.clone(), directory.clone()),
        directory.clone(),
    )
}

fn directory() -> FakeDirectory {
    FakeDirectory::with_roles(vec![
        realm_role("admin"),
        realm_role("offline_access"),
        realm_role("auditor"),
        client_role("X", "reader"),
        client_role("account", "view-profile"),
    ])
}

#[tokio::test]
async fn reconcile_returns_exhaustive_state() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["offline_access", "view-profile"])
        .await;

    let applied = service
        .reconcile(ReconcileRequest {
            target: target.clone(),
            role_ids: role_ids(&["admin", "reader"]),
            previous_role_ids: None,
            exhaustive: true,
        })
        .await;

    assert!(applied.is_ok());
    let applied = applied.unwrap_or_else(|_| unreachable!());
    assert_eq!(applied.id, "acme/u-1");
    assert_eq!(applied.role_ids, role_ids(&["admin", "reader"]));
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["admin", "reader"])
    );
}

#[tokio::test]
async fn additive_reconcile_keeps_default_roles_out_of_state() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["offline_access", "view-profile"])
        .await;

    let applied = service
        .reconcile(ReconcileRequest {
            target: target.clone(),
            role_ids: role_ids(&["admin"]),
            previous_role_ids: None,
            exhaustive: false,
        })
        .await;

    assert!(applied.is_ok());
    assert_eq!(
        applied.map(|applied| applied.role_ids).unwrap_or_default(),
        role_ids(&["admin"])
    );
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["admin", "offline_access", "view-profile"])
    );
}

#[tokio::test]
async fn additive_reconcile_removes_roles_dropped_from_configuration() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["admin", "auditor", "offline_access"])
        .await;

    let applied = service
        .reconcile(ReconcileRequest {
            target: target.clone(),
            role_ids: role_ids(&["admin"]),
            previous_role_ids: Some(role_ids(&["admin", "auditor"])),
            exhaustive: false,
        })
        .await;

    assert!(applied.is_ok());
    assert_eq!(
        directory.recorded_calls().await,
        role_ids(&["remove_realm:auditor"])
    );
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["admin", "offline_access"])
    );
}

#[tokio::test]
async fn reconcile_with_unknown_role_changes_nothing() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory.assign(&target, &["auditor"]).await;

    let result = service
        .reconcile(ReconcileRequest {
            target: target.clone(),
            role_ids: role_ids(&["admin", "ghost"]),
            previous_role_ids: None,
            exhaustive: true,
        })
        .await;

    assert!(matches!(result, Err(ReconcileError::Lookup { .. })));
    assert!(directory.recorded_calls().await.is_empty());
    assert_eq!(directory.assigned_ids(&target).await, role_ids(&["auditor"]));
}

#[tokio::test]
async fn read_filters_to_configured_roles_when_additive() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["admin", "offline_access", "reader"])
        .await;

    let additive = service
        .read(&target, &role_ids(&["reader", "auditor"]), false)
        .await;
    let exhaustive = service.read(&target, &role_ids(&["reader"]), true).await;

    assert_eq!(
        additive
            .ok()
            .flatten()
            .map(|applied| applied.role_ids)
            .unwrap_or_default(),
        role_ids(&["reader"])
    );
    assert_eq!(
        exhaustive
            .ok()
            .flatten()
            .map(|applied| applied.role_ids)
            .unwrap_or_default(),
        role_ids(&["admin", "offline_access", "reader"])
    );
}

#[tokio::test]
async fn read_of_missing_principal_drops_state() {
    let directory = Arc::new(directory());
    let service = service(&directory);

    let result = service
        .read(&user_target("acme", "gone"), &role_ids(&["admin"]), true)
        .await;

    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn plan_has_no_side_effects() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory.assign(&target, &["auditor"]).await;

    let delta = service
        .plan(&ReconcileRequest {
            target: target.clone(),
            role_ids: role_ids(&["admin"]),
            previous_role_ids: None,
            exhaustive: true,
        })
        .await;

    assert!(delta.is_ok());
    let delta = delta.unwrap_or_default();
    assert_eq!(delta.added_role_ids(), role_ids(&["admin"]));
    assert_eq!(delta.removed_role_ids(), role_ids(&["auditor"]));
    assert!(directory.recorded_calls().await.is_empty());
}

#[tokio::test]
async fn additive_plan_matches_additive_reconcile() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory.assign(&target, &["offline_access"]).await;
    let request = ReconcileRequest {
        target: target.clone(),
        role_ids: role_ids(&["admin"]),
        previous_role_ids: None,
        exhaustive: false,
    };

    let plan = service.plan(&request).await.unwrap_or_default();
    let applied = service.reconcile(request).await;

    assert!(applied.is_ok());
    assert!(!plan.has_removals());
    assert_eq!(plan.added_role_ids(), role_ids(&["admin"]));
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["admin", "offline_access"])
    );
}

#[tokio::test]
async fn plan_shows_roles_dropped_since_previous_pass() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["admin", "offline_access", "reader"])
        .await;
    let request = ReconcileRequest {
        target: target.clone(),
        role_ids: role_ids(&["admin"]),
        previous_role_ids: Some(role_ids(&["admin", "reader", "auditor"])),
        exhaustive: false,
    };

    let plan = service.plan(&request).await.unwrap_or_default();
    assert!(directory.recorded_calls().await.is_empty());
    let applied = service.reconcile(request).await;

    assert!(applied.is_ok());
    assert!(!plan.has_additions());
    assert_eq!(plan.removed_role_ids(), role_ids(&["reader"]));
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["admin", "offline_access"])
    );
}

#[tokio::test]
async fn import_adopts_every_assigned_role() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory.assign(&target, &["auditor", "reader"]).await;

    let imported = service.import(&target).await;

    assert!(imported.is_ok());
    let imported = imported.unwrap_or_else(|_| unreachable!());
    assert!(imported.exhaustive);
    assert_eq!(imported.role_ids, role_ids(&["auditor", "reader"]));
}

#[tokio::test]
async fn import_of_missing_principal_fails() {
    let directory = Arc::new(directory());
    let service = service(&directory);

    let result = service.import(&user_target("acme", "gone")).await;

    assert!(matches!(
        result,
        Err(ReconcileError::ExistingState {
            source: AppError::NotFound(_)
        })
    ));
}

#[tokio::test]
async fn delete_removes_only_configured_roles() {
    let directory = Arc::new(directory());
    let service = service(&directory);
    let target = user_target("acme", "u-1");
    directory
        .assign(&target, &["admin", "offline_access", "reader"])
        .await;

    let report = service.delete(&target, &role_ids(&["admin", "reader"])).await;

    assert!(report.is_ok());
    assert_eq!(report.unwrap_or_default().roles_removed, 2);
    assert_eq!(
        directory.assigned_ids(&target).await,
        role_ids(&["offline_access"])
    );
}
