use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;

use crate::models::storage::StoreError;

/// Public shape of a single field's validation failure. Only these fields are
/// ever emitted; the offending path and value are not part of the shape.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub name: &'static str,
    pub message: String,
    pub kind: String,
    pub properties: FieldProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldProperties {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: "ValidatorError",
            kind: kind.to_string(),
            properties: FieldProperties {
                message: message.clone(),
                kind: kind.to_string(),
            },
            message,
        }
    }
}

/// Field-keyed validation failures for one payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationFailure {
    pub errors: BTreeMap<String, FieldError>,
}

impl ValidationFailure {
    pub fn add(&mut self, field: &str, error: FieldError) {
        self.errors.insert(field.to_string(), error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Terminal error for a request. Every variant maps to exactly one JSON
/// envelope with HTTP 400; 404s are ordinary control flow in the handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(ValidationFailure),
    #[error("{field} must be unique.")]
    Duplicate { field: String },
    #[error("{}", .message.as_deref().unwrap_or("something went wrong"))]
    Other {
        context: Option<&'static str>,
        message: Option<String>,
    },
}

impl ApiError {
    /// Tags a store failure with the handler's context message. Duplicate-key
    /// conflicts keep their own envelope; everything else reports generically.
    pub fn from_store(err: StoreError, context: &'static str) -> Self {
        match err {
            StoreError::Duplicate { field } => ApiError::Duplicate { field },
            other => ApiError::Other {
                context: Some(context),
                message: Some(other.to_string()),
            },
        }
    }
}

impl From<ValidationFailure> for ApiError {
    fn from(failure: ValidationFailure) -> Self {
        ApiError::Validation(failure)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Validation {
        name: &'static str,
        errors: BTreeMap<String, FieldError>,
    },
    Text(String),
    Message {
        message: String,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = match self {
            ApiError::Validation(failure) => ErrorEnvelope {
                success: false,
                message: "Validation failed".to_string(),
                error: ErrorDetail::Validation {
                    name: "ValidationError",
                    errors: failure.errors,
                },
            },
            ApiError::Duplicate { field } => ErrorEnvelope {
                success: false,
                message: "Duplicate Value Error".to_string(),
                error: ErrorDetail::Text(format!("{} must be unique.", field)),
            },
            ApiError::Other { context, message } => {
                error!(
                    "Request failed: {}",
                    message.as_deref().unwrap_or("unknown error")
                );
                ErrorEnvelope {
                    success: false,
                    message: context
                        .map(str::to_string)
                        .or_else(|| message.clone())
                        .unwrap_or_else(|| "something went wrong".to_string()),
                    error: ErrorDetail::Message {
                        message: message.unwrap_or_else(|| "An error occurred".to_string()),
                    },
                }
            }
        };

        (StatusCode::BAD_REQUEST, Json(envelope)).into_response()
    }
}
