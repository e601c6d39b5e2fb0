//! Cluster metrics: gathering node status from Cassandra and exposing it as gauges.

pub mod gatherer;
pub mod node_status;
#[cfg(test)]
mod node_status_test;
pub mod registry;
pub mod trigger;
