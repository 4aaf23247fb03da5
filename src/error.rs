use std::collections::BTreeMap;

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;

use crate::database::StoreError;
use crate::razorpay_util::GatewayError;

/// Field name -> list of problems, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> FieldErrors {
        FieldErrors(BTreeMap::new())
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turns the collected errors into a validation failure, if there are any.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidFields(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid fields: {0:?}")]
    InvalidFields(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("CSRF verification failed. {0}")]
    CsrfFailed(&'static str),

    #[error("Please add your address before subscribing")]
    AddressRequired,

    #[error("Invalid payment signature")]
    SignatureMismatch,

    #[error("Unknown payment order")]
    UnknownOrder,

    #[error("Payment amount does not match the selected plan")]
    AmountMismatch,

    #[error("Payment gateway not configured")]
    GatewayNotConfigured,

    #[error("Failed to create order: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("background worker failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidFields(_)
            | ApiError::BadRequest(_)
            | ApiError::AddressRequired
            | ApiError::SignatureMismatch
            | ApiError::UnknownOrder
            | ApiError::AmountMismatch => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::CsrfFailed(_) => StatusCode::FORBIDDEN,
            ApiError::GatewayNotConfigured
            | ApiError::Gateway(_)
            | ApiError::Storage(_)
            | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::InvalidFields(fields) => HttpResponse::BadRequest().json(fields),
            ApiError::Storage(_) | ApiError::Blocking(_) => {
                // the details stay in the log, the client only learns that something broke
                log::error!("Internal error while handling request: {}", self);
                HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
            }
            other => HttpResponse::build(other.status_code()).json(json!({ "error": other.to_string() })),
        }
    }
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> ApiError {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        ApiError::InvalidFields(errors)
    }
}
