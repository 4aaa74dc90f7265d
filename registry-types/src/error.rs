use std::fmt::Display;

use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};
use thiserror::Error;

pub use http::StatusCode;
use tracing_error::SpanTrace;

/// A shared error type used to produce a public error body and add
/// additional context for internal diagnostics. The public body is
/// `{component, operation, detail, status}`. No stack trace is ever
/// serialized; the `span_trace` is for internal logging only.
#[serde_as]
#[derive(Error, Debug, Serialize)]
pub struct ApiError {
    #[serde(default = "default_component")]
    pub component: String,
    #[serde(default = "default_operation")]
    pub operation: String,
    // Only the Display format of the source error will be returned to the client.
    #[serde(rename = "detail")]
    #[serde_as(as = "DisplayFromStr")]
    #[source]
    pub error: anyhow::Error,
    #[serde(rename = "status", serialize_with = "serialize_status_code")]
    pub status_code: StatusCode,
    #[serde(skip)]
    pub span_trace: Option<SpanTrace>,
}

fn default_component() -> String {
    "registry".to_string()
}

fn default_operation() -> String {
    "unknown".to_string()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_status_code<S: serde::Serializer>(
    status_code: &StatusCode,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status_code.as_u16())
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = self.report();
        // Using Debug impl here in Display impl because ApiError
        // doesn't need the Display impl
        write!(f, "{report:?}")
    }
}

#[derive(Debug)]
pub struct Report {
    pub cause: String,
    pub span_trace: Option<SpanTrace>,
}

impl ApiError {
    fn new(status_code: StatusCode, msg: &str) -> Self {
        Self {
            component: default_component(),
            operation: default_operation(),
            error: anyhow::Error::msg(msg.to_string()),
            status_code,
            span_trace: Some(SpanTrace::capture()),
        }
    }

    /// Tag the error with the component/operation that produced it, for the
    /// `{component, operation, detail, status}` error body.
    #[must_use]
    pub fn in_context(mut self, component: &str, operation: &str) -> Self {
        self.component = component.to_string();
        self.operation = operation.to_string();
        self
    }

    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad request")
    }

    #[must_use]
    pub fn bad_cursor() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Malformed pagination cursor")
    }

    #[must_use]
    pub fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "User is not authorized to perform this operation",
        )
    }

    /// ABAC denial. A denied request is indistinguishable from a request
    /// against a non-existent resource unless the caller has already
    /// established the resource exists.
    #[must_use]
    pub fn denied() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Access denied")
    }

    /// ABAC denial carrying the reason the authorizer recorded, surfaced
    /// to operators in logs and error bodies without exposing rule
    /// internals to the caller.
    #[must_use]
    pub fn denied_because(reason: impl Display) -> Self {
        Self::new(StatusCode::FORBIDDEN, &format!("Access denied ({reason})"))
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    #[must_use]
    pub fn conflict() -> Self {
        Self::new(StatusCode::CONFLICT, "A resource with that identifier already exists")
    }

    #[must_use]
    pub fn report(&self) -> Report {
        Report {
            cause: format!("{:?}", self.error.root_cause()),
            span_trace: self.span_trace.clone(),
        }
    }
}

impl From<ApiError> for hyper::Response<hyper::Body> {
    fn from(err: ApiError) -> Self {
        match serde_json::to_vec(&err) {
            Ok(err_body) => hyper::Response::builder()
                .header(CONTENT_TYPE, "application/json")
                .status(err.status_code)
                .body(err_body.into())
                .expect("a valid response"),
            Err(_) => hyper::Response::builder()
                .header(CONTENT_TYPE, "application/json")
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body("Internal error. Unable to return the error response.".into())
                .expect("a valid response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    pub struct DummyError {
        pub debug_field: String,
        pub display_field: String,
    }

    impl std::error::Error for DummyError {}

    impl Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", &self.display_field)
        }
    }

    #[test]
    fn serialize_api_error() {
        let err = DummyError {
            debug_field: "debug error".into(),
            display_field: "display error".into(),
        };
        let api_err = ApiError {
            component: "descriptors".into(),
            operation: "list".into(),
            error: err.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            span_trace: None,
        };

        let api_err_serialized = serde_json::to_string(&api_err).unwrap();
        assert_eq!(
            api_err_serialized,
            r#"{"component":"descriptors","operation":"list","detail":"display error","status":500}"#
        );

        // The error report should use the Debug impl of the root cause
        let err_report = format!("{:?}", api_err.report());
        assert_eq!(
            err_report,
            r#"Report { cause: "DummyError { debug_field: \"debug error\", display_field: \"display error\" }", span_trace: None }"#
        );
    }

    #[test]
    fn denied_and_not_found_are_distinct_status_codes() {
        assert_eq!(ApiError::denied().status_code, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found().status_code, StatusCode::NOT_FOUND);
    }
}
