use hyper::{header::CONTENT_TYPE, Body, StatusCode};
use registry_types::response::Response;

/// The wire envelope a route handler's [`Response`] is wrapped in before it
/// leaves the process. `registry_types::response::Response` has no notion
/// of HTTP, so the conversion lives here, at the edge.
pub fn into_hyper_response(response: &Response) -> hyper::Response<Body> {
    match serde_json::to_vec(response) {
        Ok(body) => hyper::Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap_or_else(|_| {
                hyper::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .expect("a valid response")
            }),
        Err(_) => hyper::Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header(CONTENT_TYPE, "application/json")
            .body("Internal error. Unable to serialize the response.".into())
            .expect("a valid response"),
    }
}
