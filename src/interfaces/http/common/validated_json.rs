//! Validated JSON extractor for Axum
//!
//! `ValidatedJson<T>` works like `axum::Json<T>` and then runs
//! `validator::Validate::validate()`. Malformed bodies and failed validation
//! are both rejected with a 400 error envelope.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::interfaces::http::error::ApiError;
use crate::shared::message_of;

pub struct ValidatedJson<T>(pub T);

pub enum ValidatedJsonRejection {
    JsonError(JsonRejection),
    ValidationError(validator::ValidationErrors),
}

impl From<ValidatedJsonRejection> for ApiError {
    fn from(rejection: ValidatedJsonRejection) -> Self {
        match rejection {
            ValidatedJsonRejection::JsonError(rejection) => {
                ApiError::bad_request(format!("Invalid JSON: {}", rejection.body_text()))
            }
            ValidatedJsonRejection::ValidationError(errors) => {
                let mut field_errors: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .flat_map(|(field, errs)| {
                        errs.iter().map(move |e| format!("{}: {}", field, message_of(e)))
                    })
                    .collect();
                field_errors.sort();

                let message = if field_errors.is_empty() {
                    "Validation failed".to_string()
                } else {
                    field_errors.join("; ")
                };
                ApiError::new(
                    axum::http::StatusCode::BAD_REQUEST,
                    "validation_error",
                    message,
                )
            }
        }
    }
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize, Validate)]
    struct Credentials {
        #[validate(length(min = 1, max = 10))]
        username: String,
        #[validate(length(min = 1))]
        password: String,
    }

    async fn handler(ValidatedJson(body): ValidatedJson<Credentials>) -> String {
        format!("{}:{}", body.username, body.password.len())
    }

    async fn send(body: Body) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/test")
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = Router::new()
            .route("/test", post(handler))
            .oneshot(req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn valid_body_passes_through() {
        let body = serde_json::json!({"username": "admin", "password": "pw"});
        let (status, _) = send(Body::from(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_is_400_envelope() {
        let (status, json) = send(Body::from("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], 400);
        assert_eq!(json["error"], "bad_request");
    }

    #[tokio::test]
    async fn failed_validation_is_400_envelope() {
        let body = serde_json::json!({"username": "", "password": ""});
        let (status, json) = send(Body::from(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
        let message = json["message"].as_str().unwrap();
        assert!(message.contains("username"));
        assert!(message.contains("password"));
    }
}
