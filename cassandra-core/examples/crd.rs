//! A script used to generate the CRD used by this project.
//!
//! Any time the CRD spec changes, this script can be run to ensure that the CRD is up-to-date and
//! ready to be synced with the cluster.

use anyhow::{Context, Result};
use cassandra_core::crd::Cassandra;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let canon = std::fs::canonicalize("..").context("error getting canonical path of current dir")?;
    let crds_path = canon.join("k8s").join("crds");
    std::fs::create_dir_all(&crds_path).with_context(|| format!("error creating CRD dir {:?}", &crds_path))?;

    let cassandra = Cassandra::crd();
    let cassandra_yaml = serde_yaml::to_string(&cassandra).context("error serializing Cassandra CRD to yaml")?;
    std::fs::write(crds_path.join("cassandra.yaml"), &cassandra_yaml).with_context(|| format!("error writing Cassandra CRD to {:?}", &crds_path))?;
    println!("Cassandra CRD written to {:?}", &crds_path);

    Ok(())
}
