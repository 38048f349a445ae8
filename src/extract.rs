use actix_web::{dev::Payload, web, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request body accepted as JSON or as an urlencoded form, validated before the handler runs.
///
/// The content type picks the parser, so a rejected form reports the form error.
pub struct Validated<T>(pub T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

fn body_error(e: impl Into<actix_web::Error>) -> ApiError {
    ApiError::BadRequest(format!("invalid request body: {}", e.into()))
}

impl<T> FromRequest for Validated<T>
where
    T: DeserializeOwned + Validate + 'static,
{
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        if req.content_type() == FORM_CONTENT_TYPE {
            let form = web::Form::<T>::from_request(req, payload);
            Box::pin(async move {
                let value = form.await.map_err(body_error)?.into_inner();
                value.validate()?;
                Ok(Validated(value))
            })
        } else {
            let json = web::Json::<T>::from_request(req, payload);
            Box::pin(async move {
                let value = json.await.map_err(body_error)?.into_inner();
                value.validate()?;
                Ok(Validated(value))
            })
        }
    }
}

/// Query string counterpart of [`Validated`].
pub struct ValidatedQuery<T>(pub T);

impl<T> FromRequest for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + 'static,
{
    type Error = ApiError;
    type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = web::Query::<T>::from_query(req.query_string())
            .map_err(|e| ApiError::BadRequest(format!("invalid query: {e}")))
            .and_then(|q| {
                let value = q.into_inner();
                value.validate()?;
                Ok(ValidatedQuery(value))
            });
        futures_util::future::ready(result)
    }
}
