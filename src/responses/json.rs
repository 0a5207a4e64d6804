use crate::errors::ServerError;
use crate::responses::ResultResp;
use astra::{Body, ResponseBuilder};
use serde::Serialize;
use serde_json::json;

/// 200 response wrapped in the `{"success": true, "data": …}` envelope.
pub fn json_response<T: Serialize>(data: &T) -> ResultResp {
    json_response_with_status(200, data)
}

pub fn json_response_with_status<T: Serialize>(status: u16, data: &T) -> ResultResp {
    let body = serde_json::to_string(&json!({ "success": true, "data": data }))
        .map_err(|e| ServerError::DbError(format!("serialize response: {e}")))?;

    let resp = ResponseBuilder::new()
        .status(status)
        .header("Content-Type", mime::APPLICATION_JSON.as_ref())
        .body(Body::from(body))
        .map_err(|_| ServerError::InternalError)?;

    Ok(resp)
}
