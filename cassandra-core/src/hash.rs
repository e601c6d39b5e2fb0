//! Config map hashing.
//!
//! The hash is stamped onto pod templates as the `clusterConfigHash` annotation, so any change to
//! a cluster's custom config map results in a rolling restart of its pods.

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 of the given config map's canonical encoding.
///
/// The canonical encoding is the JSON object `{binaryData?, data, name}` with keys in sorted
/// order. `binaryData` is only included when non-empty. No config map hashes to an empty string.
pub fn config_map_hash(cm: Option<&ConfigMap>) -> String {
    let cm = match cm {
        Some(cm) => cm,
        None => {
            tracing::warn!("attempted to hash a missing config map");
            return String::new();
        }
    };
    let encoded = encode_config_map(cm);
    hex::encode(Sha256::digest(encoded.as_bytes()))
}

fn encode_config_map(cm: &ConfigMap) -> String {
    // serde_json's default map is ordered by key, which keeps this encoding stable.
    let mut map = Map::new();
    map.insert("name".into(), json!(cm.metadata.name.as_deref().unwrap_or_default()));
    map.insert("data".into(), json!(cm.data));
    if let Some(binary_data) = cm.binary_data.as_ref().filter(|data| !data.is_empty()) {
        map.insert("binaryData".into(), json!(binary_data));
    }
    Value::Object(map).to_string()
}
