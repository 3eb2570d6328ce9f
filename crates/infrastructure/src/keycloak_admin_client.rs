//! Keycloak admin REST adapter for role lookup, assignment and read-back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use rolesync_application::{RoleAssignmentGateway, RoleLookup, RoleMappingReader};
use rolesync_core::{AppError, AppResult};
use rolesync_domain::{Principal, RoleMapping, RoleRef};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

mod representations;

use self::representations::{AccessTokenResponse, MappingsRepresentation, RoleRepresentation};

/// How the client authenticates against the token endpoint.
#[derive(Clone)]
pub enum KeycloakCredentials {
    /// `client_credentials` grant with a confidential client secret.
    ClientSecret(String),
    /// `password` grant for an admin user.
    Password {
        /// Admin username.
        username: String,
        /// Admin password.
        password: String,
    },
}

/// Keycloak admin client configuration.
#[derive(Clone)]
pub struct KeycloakClientConfig {
    /// Server root url used for token requests.
    pub url: String,
    /// Path prefix in front of `/realms`, e.g. `/auth` on legacy servers.
    pub base_path: String,
    /// Server root for admin calls when it differs from `url`.
    pub admin_url: Option<String>,
    /// Realm the client authenticates in.
    pub realm: String,
    /// OAuth client id.
    pub client_id: String,
    /// Grant used to obtain access tokens.
    pub credentials: KeycloakCredentials,
    /// Suffix appended to the `User-Agent` header.
    pub user_agent: Option<String>,
    /// Static headers sent with every request.
    pub additional_headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u8,
    /// Linear backoff step between attempts.
    pub retry_backoff_ms: u64,
    /// Path to a PEM bundle trusted in addition to the system roots.
    pub root_ca_certificate: Option<String>,
    /// Accepts any server certificate. Only for test servers.
    pub tls_insecure_skip_verify: bool,
}

/// Role lookup, assignment gateway and role mapping reader over the Keycloak admin API.
pub struct KeycloakAdminClient {
    http_client: reqwest::Client,
    token_url: Url,
    admin_root: Url,
    client_id: String,
    credentials: KeycloakCredentials,
    max_attempts: u8,
    retry_backoff_ms: u64,
    access_token: Mutex<Option<String>>,
}

impl KeycloakAdminClient {
    /// Builds the client. Fails on malformed urls or headers.
    pub fn new(config: KeycloakClientConfig) -> AppResult<Self> {
        let base_path = config.base_path.trim_end_matches('/');
        let server_root = parse_root(&config.url, base_path)?;
        let admin_root = match config.admin_url.as_deref() {
            Some(admin_url) => parse_root(admin_url, base_path)?,
            None => server_root.clone(),
        };
        let token_url = endpoint(
            &server_root,
            &[
                "realms",
                config.realm.as_str(),
                "protocol",
                "openid-connect",
                "token",
            ],
        )?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.additional_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|error| {
                AppError::Validation(format!("invalid additional header name '{name}': {error}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|error| {
                AppError::Validation(format!("invalid value for header '{name}': {error}"))
            })?;
            headers.insert(header_name, header_value);
        }

        let user_agent = match config.user_agent.as_deref() {
            Some(suffix) if !suffix.trim().is_empty() => {
                format!("rolesync/{} {}", env!("CARGO_PKG_VERSION"), suffix.trim())
            }
            _ => format!("rolesync/{}", env!("CARGO_PKG_VERSION")),
        };

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent)
            .default_headers(headers);

        if let Some(path) = config.root_ca_certificate.as_deref() {
            for certificate in load_root_certificates(path)? {
                builder = builder.add_root_certificate(certificate);
            }
        }

        if config.tls_insecure_skip_verify {
            warn!("keycloak TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http_client = builder
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            http_client,
            token_url,
            admin_root,
            client_id: config.client_id,
            credentials: config.credentials,
            max_attempts: config.max_attempts.max(1),
            retry_backoff_ms: config.retry_backoff_ms.max(50),
            access_token: Mutex::new(None),
        })
    }

    fn admin_endpoint(&self, realm_id: &str, segments: &[&str]) -> AppResult<Url> {
        let mut path = vec!["admin", "realms", realm_id];
        path.extend_from_slice(segments);
        endpoint(&self.admin_root, &path)
    }

    fn role_mappings_endpoint(
        &self,
        realm_id: &str,
        principal: &Principal,
        segments: &[&str],
    ) -> AppResult<Url> {
        let mut path = vec![
            principal.kind().path_segment(),
            principal.id(),
            "role-mappings",
        ];
        path.extend_from_slice(segments);
        self.admin_endpoint(realm_id, &path)
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self, rejected: &str) {
        let mut cached = self.access_token.lock().await;
        if cached.as_deref() == Some(rejected) {
            *cached = None;
        }
    }

    async fn fetch_token(&self) -> AppResult<String> {
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("client_id", &self.client_id);
            match &self.credentials {
                KeycloakCredentials::ClientSecret(secret) => {
                    form.append_pair("grant_type", "client_credentials");
                    form.append_pair("client_secret", secret);
                }
                KeycloakCredentials::Password { username, password } => {
                    form.append_pair("grant_type", "password");
                    form.append_pair("username", username);
                    form.append_pair("password", password);
                }
            }
            form.finish()
        };

        debug!(token_url = %self.token_url, "requesting access token");
        let response = self
            .send_with_retry("access token request", |client| {
                client
                    .post(self.token_url.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone())
            })
            .await?;
        let response = ensure_success("access token request", response).await?;

        response
            .json::<AccessTokenResponse>()
            .await
            .map(|token| token.access_token)
            .map_err(|error| AppError::Internal(format!("invalid access token response: {error}")))
    }

    /// Sends an authenticated admin request, refreshing the token once on 401.
    async fn send_admin<F>(&self, context: &str, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = self
            .send_with_retry(context, |client| build(client).bearer_auth(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(context, response).await;
        }

        debug!(context, "access token rejected, requesting a new one");
        self.invalidate_token(&token).await;
        let token = self.access_token().await?;
        let response = self
            .send_with_retry(context, |client| build(client).bearer_auth(&token))
            .await?;
        ensure_success(context, response).await
    }

    async fn send_with_retry<F>(&self, context: &str, mut build: F) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);

            match build(&self.http_client).send().await {
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "{context} got transient HTTP status {}",
                        response.status()
                    ));
                }
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(format!("{context} transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                warn!(
                    context,
                    attempt,
                    delay_ms = delay,
                    error = last_error.as_deref().unwrap_or_default(),
                    "retrying keycloak request"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            format!("{context} exhausted retries")
        })))
    }

    async fn change_role_mappings(
        &self,
        method: Method,
        realm_id: &str,
        principal: &Principal,
        segments: &[&str],
        roles: &[RoleRef],
    ) -> AppResult<()> {
        if roles.is_empty() {
            return Ok(());
        }

        let url = self.role_mappings_endpoint(realm_id, principal, segments)?;
        let body: Vec<RoleRepresentation> = roles.iter().map(RoleRepresentation::from).collect();
        let context = format!("{method} {}", url.path());

        debug!(%principal, %method, count = roles.len(), "changing role mappings");
        self.send_admin(&context, |client| {
            client.request(method.clone(), url.clone()).json(&body)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RoleLookup for KeycloakAdminClient {
    async fn get_role(&self, realm_id: &str, role_id: &str) -> AppResult<RoleRef> {
        let url = self.admin_endpoint(realm_id, &["roles-by-id", role_id])?;
        let context = format!("lookup of role '{role_id}'");

        let response = self
            .send_admin(&context, |client| client.get(url.clone()))
            .await?;
        let representation = response
            .json::<RoleRepresentation>()
            .await
            .map_err(|error| AppError::Internal(format!("invalid role representation: {error}")))?;

        representation.into_role()
    }
}

#[async_trait]
impl RoleAssignmentGateway for KeycloakAdminClient {
    async fn add_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.change_role_mappings(Method::POST, realm_id, principal, &["realm"], roles)
            .await
    }

    async fn remove_realm_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.change_role_mappings(Method::DELETE, realm_id, principal, &["realm"], roles)
            .await
    }

    async fn add_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.change_role_mappings(
            Method::POST,
            realm_id,
            principal,
            &["clients", client_id],
            roles,
        )
        .await
    }

    async fn remove_client_roles(
        &self,
        realm_id: &str,
        principal: &Principal,
        client_id: &str,
        roles: &[RoleRef],
    ) -> AppResult<()> {
        self.change_role_mappings(
            Method::DELETE,
            realm_id,
            principal,
            &["clients", client_id],
            roles,
        )
        .await
    }
}

#[async_trait]
impl RoleMappingReader for KeycloakAdminClient {
    async fn get_role_mapping(
        &self,
        realm_id: &str,
        principal: &Principal,
    ) -> AppResult<RoleMapping> {
        let url = self.role_mappings_endpoint(realm_id, principal, &[])?;
        let context = format!("role mappings of {principal}");

        let response = self
            .send_admin(&context, |client| client.get(url.clone()))
            .await?;
        let representation = response
            .json::<MappingsRepresentation>()
            .await
            .map_err(|error| {
                AppError::Internal(format!("invalid role mappings representation: {error}"))
            })?;

        representation.into_mapping()
    }
}

fn load_root_certificates(path: &str) -> AppResult<Vec<reqwest::Certificate>> {
    let pem = std::fs::read(path).map_err(|error| {
        AppError::Validation(format!("cannot read root CA certificate '{path}': {error}"))
    })?;
    let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|error| {
        AppError::Validation(format!("invalid root CA certificate '{path}': {error}"))
    })?;

    if certificates.is_empty() {
        return Err(AppError::Validation(format!(
            "root CA certificate '{path}' holds no PEM certificate"
        )));
    }

    Ok(certificates)
}

fn parse_root(root: &str, base_path: &str) -> AppResult<Url> {
    let value = format!("{}{base_path}", root.trim_end_matches('/'));
    Url::parse(&value)
        .map_err(|error| AppError::Validation(format!("invalid keycloak url '{value}': {error}")))
}

fn endpoint(root: &Url, segments: &[&str]) -> AppResult<Url> {
    let mut url = root.clone();
    url.path_segments_mut()
        .map_err(|()| AppError::Validation(format!("keycloak url '{root}' cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn ensure_success(context: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    Err(status_error(status, &format!("{context} failed with status {status}: {body}")))
}

fn status_error(status: StatusCode, message: &str) -> AppError {
    let message = message.to_owned();
    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        _ => AppError::Internal(message),
    }
}
