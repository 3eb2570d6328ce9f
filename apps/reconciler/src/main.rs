//! Rolesync reconciler runtime.

#![forbid(unsafe_code)]

mod reconciler_config;

use std::env;
use std::sync::Arc;

use rolesync_application::{
    AppliedRoleMapping, ReconcileRequest, RoleMappingReconciler, RoleMappingService,
};
use rolesync_core::{AppError, AppResult};
use rolesync_infrastructure::KeycloakAdminClient;
use serde::Serialize;
use tracing::{error, info};

use crate::reconciler_config::{Command, ReconcilerConfig, init_tracing};

#[derive(Debug, Serialize)]
struct RoleMappingOutput<'a> {
    id: &'a str,
    role_ids: &'a [String],
    exhaustive: bool,
}

#[derive(Debug, Serialize)]
struct DeleteOutput<'a> {
    id: &'a str,
    roles_removed: usize,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = env::args()
        .nth(1)
        .map(|value| value.parse::<Command>())
        .transpose()?
        .unwrap_or(Command::Apply);
    let config = ReconcilerConfig::load(command)?;

    let client = Arc::new(KeycloakAdminClient::new(config.keycloak.clone())?);
    let service = RoleMappingService::new(
        RoleMappingReconciler::new(client.clone(), client.clone()),
        client,
    );

    info!(
        %command,
        target = %config.target,
        exhaustive = config.exhaustive,
        role_count = config.role_ids.len(),
        "rolesync-reconciler started"
    );

    run(command, &service, config)
        .await
        .inspect_err(|error| error!(%command, error = %error, "rolesync-reconciler failed"))
}

async fn run(
    command: Command,
    service: &RoleMappingService,
    config: ReconcilerConfig,
) -> AppResult<()> {
    let ReconcilerConfig {
        target,
        role_ids,
        previous_role_ids,
        exhaustive,
        ..
    } = config;

    match command {
        Command::Apply => {
            let applied = service
                .reconcile(ReconcileRequest {
                    target,
                    role_ids,
                    previous_role_ids,
                    exhaustive,
                })
                .await?;
            print_applied(Some(&applied))
        }
        Command::Plan => {
            let delta = service
                .plan(&ReconcileRequest {
                    target,
                    role_ids,
                    previous_role_ids,
                    exhaustive,
                })
                .await?;
            print!("{delta}");
            Ok(())
        }
        Command::Read => {
            let applied = service.read(&target, &role_ids, exhaustive).await?;
            print_applied(applied.as_ref())
        }
        Command::Import => {
            let applied = service.import(&target).await?;
            print_applied(Some(&applied))
        }
        Command::Delete => {
            let report = service.delete(&target, &role_ids).await?;
            let id = target.resource_id();
            print_json(&DeleteOutput {
                id: &id,
                roles_removed: report.roles_removed,
            })
        }
    }
}

/// Prints `null` when the principal is gone.
fn print_applied(applied: Option<&AppliedRoleMapping>) -> AppResult<()> {
    let output = applied.map(|applied| RoleMappingOutput {
        id: &applied.id,
        role_ids: &applied.role_ids,
        exhaustive: applied.exhaustive,
    });
    print_json(&output)
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|error| AppError::Internal(format!("failed to render output: {error}")))?;
    println!("{rendered}");
    Ok(())
}
