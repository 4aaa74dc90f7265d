use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing_error::SpanTrace;

use crate::error::ApiError;

/// Response from a route handler.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Raw response. The data will be returned as is to the client.
    Raw(Value),
    /// A page of rows plus an opaque cursor for the next page (cursor
    /// format: base64 of the id of the first element to include next).
    Page(PageResponse),
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub items: Vec<Value>,
    pub cursor: Option<String>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self::Raw(Value::default())
    }

    /// Construct a response with data that will be returned as is to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if it fails to serialize the payload.
    pub fn raw<T: Serialize>(data: T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(data).map(Self::Raw)
    }

    /// Construct a paginated response from already-serialized rows.
    ///
    /// # Errors
    ///
    /// Returns an error if any row fails to serialize.
    pub fn page<T: Serialize>(items: Vec<T>, cursor: Option<String>) -> Result<Self, serde_json::Error> {
        let items = items
            .into_iter()
            .map(|item| serde_json::to_value(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Page(PageResponse { items, cursor }))
    }

    /// Try to deserialize the raw data payload from the response.
    ///
    /// # Errors
    ///
    /// Returns an error if it fails to deserialize the raw payload or if the
    /// response is not a raw payload.
    pub fn data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            Response::Raw(data) => serde_json::from_value(data).map_err(|err| ApiError {
                component: "response".to_string(),
                operation: "data".to_string(),
                error: err.into(),
                status_code: StatusCode::BAD_REQUEST,
                span_trace: Some(SpanTrace::capture()),
            }),
            Response::Page(_data) => Err(ApiError {
                component: "response".to_string(),
                operation: "data".to_string(),
                error: anyhow::Error::msg("expected raw data, found a paginated response"),
                status_code: StatusCode::BAD_REQUEST,
                span_trace: Some(SpanTrace::capture()),
            }),
        }
    }
}
