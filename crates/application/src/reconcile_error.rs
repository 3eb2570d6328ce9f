use std::fmt::{Display, Formatter};

use rolesync_core::AppError;
use thiserror::Error;

/// Gateway call that failed during apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOperation {
    /// Assigning realm roles.
    AddRealmRoles,
    /// Removing realm role assignments.
    RemoveRealmRoles,
    /// Assigning roles of one client.
    AddClientRoles {
        /// Internal client id.
        client_id: String,
    },
    /// Removing role assignments of one client.
    RemoveClientRoles {
        /// Internal client id.
        client_id: String,
    },
}

impl Display for GatewayOperation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddRealmRoles => write!(formatter, "add realm roles"),
            Self::RemoveRealmRoles => write!(formatter, "remove realm roles"),
            Self::AddClientRoles { client_id } => {
                write!(formatter, "add roles of client '{client_id}'")
            }
            Self::RemoveClientRoles { client_id } => {
                write!(formatter, "remove roles of client '{client_id}'")
            }
        }
    }
}

/// Failures surfaced by role mapping reconciliation.
///
/// The collaborator error is always kept unchanged as the source.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A desired role id could not be resolved.
    #[error("failed to resolve role '{role_id}': {source}")]
    Lookup {
        /// The role id that failed to resolve.
        role_id: String,
        /// Error returned by the role lookup.
        #[source]
        source: AppError,
    },

    /// An add or remove call failed. Earlier calls of the same pass stay applied.
    #[error("failed to {operation}: {source}")]
    Gateway {
        /// The call that failed.
        operation: GatewayOperation,
        /// Error returned by the gateway.
        #[source]
        source: AppError,
    },

    /// The existing role mapping could not be fetched.
    #[error("failed to read existing role mapping: {source}")]
    ExistingState {
        /// Error returned by the mapping reader.
        #[source]
        source: AppError,
    },
}

impl ReconcileError {
    /// Returns the collaborator error behind this failure.
    #[must_use]
    pub fn source_error(&self) -> &AppError {
        match self {
            Self::Lookup { source, .. }
            | Self::Gateway { source, .. }
            | Self::ExistingState { source } => source,
        }
    }

    /// Returns true when the underlying error reports a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.source_error().is_not_found()
    }
}

impl From<ReconcileError> for AppError {
    fn from(error: ReconcileError) -> Self {
        let message = error.to_string();
        match error.source_error() {
            AppError::Validation(_) => AppError::Validation(message),
            AppError::NotFound(_) => AppError::NotFound(message),
            AppError::Conflict(_) => AppError::Conflict(message),
            AppError::Unauthorized(_) => AppError::Unauthorized(message),
            AppError::Forbidden(_) => AppError::Forbidden(message),
            AppError::Internal(_) => AppError::Internal(message),
        }
    }
}
