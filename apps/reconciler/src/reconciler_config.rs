use std::env;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use rolesync_core::{AppError, AppResult};
use rolesync_domain::{Principal, PrincipalKind, RoleMappingTarget};
use rolesync_infrastructure::{KeycloakClientConfig, KeycloakCredentials};
use tracing_subscriber::EnvFilter;

/// Operation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Apply,
    Plan,
    Read,
    Delete,
    Import,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Plan => "plan",
            Self::Read => "read",
            Self::Delete => "delete",
            Self::Import => "import",
        }
    }
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "apply" => Ok(Self::Apply),
            "plan" => Ok(Self::Plan),
            "read" => Ok(Self::Read),
            "delete" => Ok(Self::Delete),
            "import" => Ok(Self::Import),
            other => Err(AppError::Validation(format!(
                "unknown command '{other}', expected one of apply, plan, read, delete, import"
            ))),
        }
    }
}

impl Display for Command {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ReconcilerConfig {
    pub keycloak: KeycloakClientConfig,
    pub target: RoleMappingTarget,
    pub role_ids: Vec<String>,
    pub previous_role_ids: Option<Vec<String>>,
    pub exhaustive: bool,
}

impl ReconcilerConfig {
    pub fn load(command: Command) -> AppResult<Self> {
        let keycloak = load_keycloak_config()?;
        let target = load_target()?;

        let exhaustive = match command {
            Command::Import => true,
            _ => optional_env("ROLESYNC_EXHAUSTIVE")
                .map(|value| parse_bool("ROLESYNC_EXHAUSTIVE", &value))
                .transpose()?
                .unwrap_or(true),
        };
        let role_ids = match command {
            Command::Import => Vec::new(),
            _ if role_ids_required(command, exhaustive) => {
                parse_list(&required_env("ROLESYNC_ROLE_IDS")?)
            }
            _ => optional_env("ROLESYNC_ROLE_IDS")
                .map(|value| parse_list(&value))
                .unwrap_or_default(),
        };
        let previous_role_ids =
            optional_env("ROLESYNC_PREVIOUS_ROLE_IDS").map(|value| parse_list(&value));

        Ok(Self {
            keycloak,
            target,
            role_ids,
            previous_role_ids,
            exhaustive,
        })
    }
}

/// Exhaustive reads and imports report every assigned role, so no ids are needed.
fn role_ids_required(command: Command, exhaustive: bool) -> bool {
    match command {
        Command::Import => false,
        Command::Read => !exhaustive,
        Command::Apply | Command::Plan | Command::Delete => true,
    }
}

fn load_keycloak_config() -> AppResult<KeycloakClientConfig> {
    let url = required_env("KEYCLOAK_URL")?;
    let base_path = optional_env("KEYCLOAK_BASE_PATH").unwrap_or_default();
    let admin_url = optional_env("KEYCLOAK_ADMIN_URL");
    let realm = optional_env("KEYCLOAK_REALM").unwrap_or_else(|| "master".to_owned());
    let client_id = required_env("KEYCLOAK_CLIENT_ID")?;

    let credentials = match optional_env("KEYCLOAK_CLIENT_SECRET") {
        Some(secret) => KeycloakCredentials::ClientSecret(secret),
        None => KeycloakCredentials::Password {
            username: required_env("KEYCLOAK_USER").map_err(|_| {
                AppError::Validation(
                    "KEYCLOAK_USER and KEYCLOAK_PASSWORD are required when KEYCLOAK_CLIENT_SECRET is not set"
                        .to_owned(),
                )
            })?,
            password: required_env("KEYCLOAK_PASSWORD").map_err(|_| {
                AppError::Validation(
                    "KEYCLOAK_PASSWORD is required when KEYCLOAK_CLIENT_SECRET is not set"
                        .to_owned(),
                )
            })?,
        },
    };

    let timeout_seconds = parse_env_u64("KEYCLOAK_CLIENT_TIMEOUT", 15)?;
    let max_attempts = parse_env_u8("KEYCLOAK_MAX_ATTEMPTS", 3)?;
    let retry_backoff_ms = parse_env_u64("KEYCLOAK_RETRY_BACKOFF_MS", 250)?;

    if timeout_seconds == 0 {
        return Err(AppError::Validation(
            "KEYCLOAK_CLIENT_TIMEOUT must be greater than zero".to_owned(),
        ));
    }

    if max_attempts == 0 {
        return Err(AppError::Validation(
            "KEYCLOAK_MAX_ATTEMPTS must be greater than zero".to_owned(),
        ));
    }

    let tls_insecure_skip_verify = optional_env("KEYCLOAK_TLS_INSECURE_SKIP_VERIFY")
        .map(|value| parse_bool("KEYCLOAK_TLS_INSECURE_SKIP_VERIFY", &value))
        .transpose()?
        .unwrap_or(false);

    let additional_headers = optional_env("KEYCLOAK_ADDITIONAL_HEADERS")
        .map(|value| parse_headers(&value))
        .transpose()?
        .unwrap_or_default();

    Ok(KeycloakClientConfig {
        url,
        base_path,
        admin_url,
        realm,
        client_id,
        credentials,
        user_agent: optional_env("KEYCLOAK_USER_AGENT"),
        additional_headers,
        timeout: Duration::from_secs(timeout_seconds),
        max_attempts,
        retry_backoff_ms,
        root_ca_certificate: optional_env("KEYCLOAK_ROOT_CA_CERTIFICATE"),
        tls_insecure_skip_verify,
    })
}

fn load_target() -> AppResult<RoleMappingTarget> {
    if let Some(import_id) = optional_env("ROLESYNC_IMPORT_ID") {
        let kind = optional_env("ROLESYNC_PRINCIPAL_KIND")
            .map(|value| value.parse::<PrincipalKind>())
            .transpose()?
            .unwrap_or(PrincipalKind::User);
        return RoleMappingTarget::parse_import_id(kind, &import_id);
    }

    let realm_id = required_env("ROLESYNC_REALM_ID")?;
    let principal = required_env("ROLESYNC_PRINCIPAL")?.parse::<Principal>()?;
    RoleMappingTarget::new(realm_id, principal)
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    optional_env(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u8(name: &str, default: u8) -> AppResult<u8> {
    match optional_env(name) {
        Some(value) => value.parse::<u8>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match optional_env(name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

/// Splits a comma separated list, dropping blank entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected true or false"
        ))),
    }
}

/// Parses `name=value` pairs separated by commas.
fn parse_headers(value: &str) -> AppResult<Vec<(String, String)>> {
    parse_list(value)
        .into_iter()
        .map(|pair| {
            let (name, header_value) = pair.split_once('=').ok_or_else(|| {
                AppError::Validation(format!(
                    "invalid KEYCLOAK_ADDITIONAL_HEADERS entry '{pair}', expected name=value"
                ))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation(format!(
                    "invalid KEYCLOAK_ADDITIONAL_HEADERS entry '{pair}', header name is empty"
                )));
            }
            Ok((name.to_owned(), header_value.trim().to_owned()))
        })
        .collect()
}
