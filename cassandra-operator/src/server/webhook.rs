use std::convert::Infallible;

use axum::extract;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview, Operation};

use cassandra_core::crd::Cassandra;

/// VAW handler for Cassandra clusters.
///
/// Creations are validated structurally; updates additionally reject changes to fields which may
/// not change after creation.
#[tracing::instrument(level = "debug", skip(payload))]
pub(super) async fn vaw_cassandras(
    mut payload: extract::Json<AdmissionReview<Cassandra>>,
) -> std::result::Result<axum::Json<AdmissionReview<DynamicObject>>, Infallible> {
    tracing::debug!(?payload, "received cassandra VAW request");
    let req = match payload.0.request.take() {
        Some(req) => req,
        None => {
            let res = AdmissionResponse::invalid("malformed webhook request received, no `request` field");
            return Ok(axum::Json::from(res.into_review()));
        }
    };

    // Unpack request components based on operation.
    let new_cluster = match &req.operation {
        // Nothing to do for these, so just accept.
        Operation::Delete | Operation::Connect => {
            return Ok(axum::Json::from(AdmissionResponse::from(&req).into_review()));
        }
        // These operations require at least the new object to be present.
        Operation::Create | Operation::Update => match &req.object {
            Some(new_cluster) => new_cluster,
            None => {
                let res = AdmissionResponse::invalid("no cassandra object found in the `object` field, can not validate");
                return Ok(axum::Json::from(res.into_review()));
            }
        },
    };

    // Perform a full validation of the new object, rejecting with the first violation found.
    if let Err(err) = new_cluster.validate() {
        let rejection = err.into_iter().next().unwrap_or_default();
        return Ok(axum::Json::from(AdmissionResponse::invalid(rejection).into_review()));
    }

    // Should only be populated for Operation::Update.
    if let Some(old_cluster) = &req.old_object {
        if let Err(err) = new_cluster.validate_compatibility(old_cluster) {
            let rejection = err.into_iter().next().unwrap_or_default();
            return Ok(axum::Json::from(AdmissionResponse::invalid(rejection).into_review()));
        }
    }

    Ok(axum::Json::from(AdmissionResponse::from(&req).into_review()))
}
