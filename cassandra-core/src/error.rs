//! Cassandra operator error abstractions.

use thiserror::Error;

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// The submitted cluster definition is structurally invalid.
    #[error("invalid cluster definition: {}", .0.join("; "))]
    InvalidSpec(Vec<String>),
    /// An update attempted to mutate a field which may not change after creation.
    #[error("{0}")]
    ForbiddenChange(String),
    /// A resource quantity could not be parsed.
    #[error("invalid quantity '{0}'")]
    InvalidQuantity(String),
    /// A config map does not follow the `<cluster>-config` naming convention.
    #[error("configMap name {0} does not follow the naming convention for a cluster")]
    InvalidConfigMapName(String),
}
