use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crm_core::CrmError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }
}

impl From<CrmError> for ProblemResponse {
    fn from(err: CrmError) -> Self {
        let status = match &err {
            CrmError::NotFound(_) => StatusCode::NOT_FOUND,
            CrmError::Validation(_) => StatusCode::BAD_REQUEST,
            CrmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind_str(), err.to_string())
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{Entity, InternalError, ValidationError};

    #[test]
    fn maps_taxonomy_to_status() {
        let not_found = ProblemResponse::from(CrmError::NotFound(Entity::Customer));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.detail, "Customer does not exist");
        assert_eq!(not_found.body.problem_type, "not_found");

        let invalid = ProblemResponse::from(CrmError::from(ValidationError::NoValidProducts));
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert_eq!(invalid.body.title, "Bad Request");

        let internal = ProblemResponse::from(CrmError::from(InternalError::store(
            "listing orders",
            "disk I/O error",
        )));
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.body.detail, "Error listing orders: disk I/O error");
    }
}
