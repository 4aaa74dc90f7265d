use registry_framework::extract::{Extension, Path, Query};
use registry_sql::{MaskFlag, QueryFilter};
use registry_types::{error::ApiError, response::Response};
use serde::Deserialize;

use crate::context::Context;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

pub async fn handle_list_aas_descriptors(
    Extension(ctx): Extension<Context>,
    Extension(filter): Extension<QueryFilter>,
    Extension(mask): Extension<Vec<MaskFlag>>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let (items, cursor) = ctx
        .repos
        .descriptor
        .list_aas_descriptors(&filter, params.cursor.as_deref(), params.limit, &mask)
        .await?;
    Response::page(items, cursor).map_err(|_| ApiError::internal_error().in_context("descriptor", "list"))
}

/// Distinguishes a denied-but-existing resource (403) from one that
/// genuinely doesn't exist (404) via an unfiltered existence pre-check,
/// so an unauthorized caller can't fingerprint ids by reading the status
/// code alone.
pub async fn handle_get_aas_descriptor(
    Extension(ctx): Extension<Context>,
    Extension(filter): Extension<QueryFilter>,
    Extension(mask): Extension<Vec<MaskFlag>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match ctx.repos.descriptor.get_aas_descriptor_by_id(&id, &filter, &mask).await? {
        Some(descriptor) => {
            Response::raw(descriptor).map_err(|_| ApiError::internal_error().in_context("descriptor", "get"))
        }
        None => {
            if ctx.repos.descriptor.aas_descriptor_exists(&id).await? {
                Err(ApiError::denied().in_context("descriptor", "get"))
            } else {
                Err(ApiError::not_found().in_context("descriptor", "get"))
            }
        }
    }
}

pub async fn handle_list_submodel_descriptors(
    Extension(ctx): Extension<Context>,
    Extension(filter): Extension<QueryFilter>,
    Extension(mask): Extension<Vec<MaskFlag>>,
    Path(aasdesc_id): Path<String>,
) -> Result<Response, ApiError> {
    let items = ctx
        .repos
        .descriptor
        .list_submodel_descriptors(&aasdesc_id, &filter, &mask)
        .await?;
    Response::raw(items).map_err(|_| ApiError::internal_error().in_context("descriptor", "list_submodels"))
}
