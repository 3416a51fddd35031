use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::ErrorBody;
use validator::Validate;

/// JSON body that has passed `validator` rules; 400 on bad JSON, 422 on rule failures.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            let body = ErrorBody {
                error: "Invalid request body".to_string(),
                details: Some(e.body_text()),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        })?;

        value.validate().map_err(|e| {
            let body = ErrorBody {
                error: "Validation failed".to_string(),
                details: Some(e.to_string()),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        })?;

        Ok(ValidatedJson(value))
    }
}
