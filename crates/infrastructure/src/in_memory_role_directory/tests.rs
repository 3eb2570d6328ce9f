use std::sync::Arc;

use rolesync_application::{
    ReconcileRequest, RoleAssignmentGateway, RoleLookup, RoleMappingReader,
    RoleMappingReconciler, RoleMappingService,
};
use rolesync_core::AppError;
use rolesync_domain::{Principal, PrincipalKind, RoleMappingTarget, RoleRef};

use super::InMemoryRoleDirectory;

fn user(id: &str) -> Principal {
    Principal::new(PrincipalKind::User, id).unwrap_or_else(|_| unreachable!())
}

fn realm_role(id: &str, name: &str) -> RoleRef {
    RoleRef::realm(id, name).unwrap_or_else(|_| unreachable!())
}

fn client_role(id: &str, name: &str, client_id: &str) -> RoleRef {
    RoleRef::client(id, name, client_id).unwrap_or_else(|_| unreachable!())
}

async fn seeded_directory() -> InMemoryRoleDirectory {
    let directory = InMemoryRoleDirectory::new();
    for role in [
        realm_role("r-admin", "admin"),
        realm_role("r-offline", "offline_access"),
        client_role("r-view", "view-profile", "c-account"),
        client_role("r-read", "reader", "c-x"),
    ] {
        let defined = directory.define_role("acme", role).await;
        assert!(defined.is_ok());
    }
    directory.register_principal("acme", user("u-1")).await;
    directory
}

#[tokio::test]
async fn lookup_is_scoped_to_realm() {
    let directory = seeded_directory().await;

    assert!(directory.get_role("acme", "r-admin").await.is_ok());
    assert!(matches!(
        directory.get_role("other", "r-admin").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn defining_a_role_twice_conflicts() {
    let directory = seeded_directory().await;

    let result = directory
        .define_role("acme", realm_role("r-admin", "admin"))
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn add_and_remove_client_roles() {
    let directory = seeded_directory().await;
    let principal = user("u-1");
    let reader = client_role("r-read", "reader", "c-x");

    let added = directory
        .add_client_roles("acme", &principal, "c-x", std::slice::from_ref(&reader))
        .await;
    assert!(added.is_ok());
    let mapping = directory.get_role_mapping("acme", &principal).await;
    assert!(mapping.unwrap_or_default().contains("r-read"));

    let removed = directory
        .remove_client_roles("acme", &principal, "c-x", &[reader])
        .await;
    assert!(removed.is_ok());
    let mapping = directory.get_role_mapping("acme", &principal).await;
    assert!(mapping.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn client_role_under_wrong_client_is_rejected() {
    let directory = seeded_directory().await;

    let result = directory
        .add_client_roles(
            "acme",
            &user("u-1"),
            "c-account",
            &[client_role("r-read", "reader", "c-x")],
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn undefined_role_is_not_assigned() {
    let directory = seeded_directory().await;

    let result = directory
        .add_realm_roles("acme", &user("u-1"), &[realm_role("r-ghost", "ghost")])
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn unknown_principal_is_not_found() {
    let directory = seeded_directory().await;

    assert!(matches!(
        directory.get_role_mapping("acme", &user("u-2")).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        directory
            .add_realm_roles("acme", &user("u-2"), &[realm_role("r-admin", "admin")])
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn service_converges_and_drops_removed_principal() {
    let directory = Arc::new(seeded_directory().await);
    let service = RoleMappingService::new(
        RoleMappingReconciler::new(directory.clone(), directory.clone()),
        directory.clone(),
    );
    let target =
        RoleMappingTarget::new("acme", user("u-1")).unwrap_or_else(|_| unreachable!());
    let seeded = directory
        .add_realm_roles("acme", target.principal(), &[realm_role("r-offline", "offline_access")])
        .await;
    assert!(seeded.is_ok());

    let applied = service
        .reconcile(ReconcileRequest {
            target: target.clone(),
            role_ids: vec!["r-admin".to_owned(), "r-read".to_owned()],
            previous_role_ids: None,
            exhaustive: true,
        })
        .await;
    assert!(applied.is_ok());
    assert_eq!(
        applied.map(|applied| applied.role_ids).unwrap_or_default(),
        vec!["r-admin".to_owned(), "r-read".to_owned()]
    );

    let plan = service
        .plan(&ReconcileRequest {
            target: target.clone(),
            role_ids: vec!["r-admin".to_owned(), "r-read".to_owned()],
            previous_role_ids: None,
            exhaustive: true,
        })
        .await;
    assert!(plan.unwrap_or_default().is_empty());

    let removed = directory.remove_principal("acme", target.principal()).await;
    assert!(removed.is_ok());
    let read = service.read(&target, &["r-admin".to_owned()], true).await;
    assert!(matches!(read, Ok(None)));
}
