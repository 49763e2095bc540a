//! Structured error taxonomy shared by the service layer and the HTTP routes.
//!
//! Mirrors the `{error, details?}` JSON shape the teacher's routes already
//! return ad hoc from `(Status, Json<Value>)` tuples, but centralizes the
//! mapping so the message/room services don't have to know about Rocket.

use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    PaymentRequired(String),
    RateLimited { message: String, retry_after_secs: u64 },
    Internal(String),
}

impl AppError {
    fn status(&self) -> Status {
        match self {
            AppError::Validation(_) => Status::BadRequest,
            AppError::Unauthorized(_) => Status::Unauthorized,
            AppError::Forbidden(_) => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::PaymentRequired(_) => Status::PaymentRequired,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::PaymentRequired(m) => m.clone(),
            AppError::RateLimited { message, .. } => message.clone(),
            AppError::Internal(m) => {
                eprintln!("⚠️ internal error: {m}");
                "Internal server error".to_string()
            }
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let mut body = json!({ "error": self.message() });
        if let AppError::RateLimited { retry_after_secs, .. } = &self {
            body["retry_after_secs"] = json!(retry_after_secs);
        }
        Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .ok()
    }
}

pub type AppResult<T> = Result<T, AppError>;
