pub mod crd;
pub mod error;
pub mod hash;
pub mod quantity;
#[cfg(test)]
mod quantity_test;
pub mod validation;

pub use error::AppError;

/// The label applied to every object created for a cluster, valued with the cluster's name.
pub const OPERATOR_LABEL: &str = "sky.uk/cassandra-operator";
/// The label identifying the rack of a stateful set and its pods.
pub const RACK_LABEL: &str = "rack";
/// The label identifying the cluster (or job) an object belongs to.
pub const APP_LABEL: &str = "app";
/// The pod template annotation carrying the hash of the cluster's custom config map.
pub const CONFIG_HASH_ANNOTATION: &str = "clusterConfigHash";
/// The suffix naming convention of a cluster's custom config map.
pub const CUSTOM_CONFIG_SUFFIX: &str = "-config";

/// Build the `<namespace>.<name>` key identifying a cluster throughout the operator.
pub fn qualified_name(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}
