//! Cassandra CRDs.
//!
//! References:
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/#additional-printer-columns

mod cassandra;

use kube::Resource;

pub use cassandra::{
    snapshot_cleanup_properties_updated, snapshot_properties_updated, Cassandra, CassandraCRD, CassandraSpec, CassandraStatus, Pod, Probe, Rack,
    RetentionPolicy, Snapshot,
};
pub use cassandra::{
    CRD_VERSION, DEFAULT_BOOTSTRAPPER_IMAGE, DEFAULT_CASSANDRA_IMAGE, DEFAULT_DATACENTER, DEFAULT_SIDECAR_IMAGE, DEFAULT_SNAPSHOT_IMAGE, NODE_SERVICE_ACCOUNT,
    SNAPSHOT_SERVICE_ACCOUNT,
};

/// A convenience trait built around the fact that all implementors
/// must have the following attributes.
pub trait RequiredMetadata {
    /// The namespace of this object.
    fn namespace(&self) -> &str;

    /// The name of this object.
    fn name(&self) -> &str;
}

impl RequiredMetadata for Cassandra {
    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}
