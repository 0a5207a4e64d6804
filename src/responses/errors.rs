use crate::errors::ServerError;
use astra::{Body, Response, ResponseBuilder};
use serde_json::json;

pub type ResultResp = Result<Response, ServerError>;

/// Convert a ServerError into the JSON error envelope.
pub fn error_to_response(err: ServerError) -> Response {
    let (status, code, message) = match &err {
        ServerError::NotFound => (404, "NOT_FOUND", "Not Found".to_string()),
        ServerError::BadRequest(msg) => (400, "BAD_REQUEST", msg.clone()),
        ServerError::Conflict(msg) => (409, "CONFLICT", msg.clone()),
        ServerError::DbError(msg) => (500, "DB_ERROR", msg.clone()),
        ServerError::InternalError => (500, "INTERNAL", "Internal Server Error".to_string()),
    };

    let body = json!({
        "success": false,
        "error": { "code": code, "message": message },
    });

    ResponseBuilder::new()
        .status(status)
        .header("Content-Type", mime::APPLICATION_JSON.as_ref())
        .body(Body::from(body.to_string()))
        .unwrap()
}
