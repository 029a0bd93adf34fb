use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::{json, Json};
use rocket::Request;

use log::error;



pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("validation failed: {}", .0.join("; "))]
	Validation(Vec<String>),

	/// Holds the id as it was requested, which need not be a valid `CameraId`.
	#[error("camera {0} not found")]
	NotFound(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("authentication failed: {0}")]
	Auth(#[from] AuthError),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("invalid configuration: {0}")]
	Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
	#[error("missing token")]
	Missing,

	#[error("invalid token")]
	Invalid,

	#[error("token expired")]
	Expired,

	#[error("invalid credentials")]
	InvalidCredentials,
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Storage(err.to_string())
	}
}

impl From<serde_yaml::Error> for Error {
	fn from(err: serde_yaml::Error) -> Self {
		Error::Storage(err.to_string())
	}
}

impl Error {
	pub fn status(&self) -> Status {
		match self {
			Error::Validation(_) | Error::BadRequest(_) => Status::BadRequest,
			Error::NotFound(_) => Status::NotFound,
			Error::Storage(_) | Error::Config(_) => Status::InternalServerError,
			Error::Auth(_) => Status::Unauthorized,
		}
	}
}

impl<'r> Responder<'r, 'static> for Error {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		let body = match &self {
			Error::Validation(errors) => json!({
				"success": false,
				"message": "Validation failed",
				"errors": errors,
			}),
			Error::NotFound(_) => json!({
				"success": false,
				"message": "Camera not found",
			}),
			Error::Storage(detail) => {
				// Details stay in the log, clients only learn that storage failed.
				error!("{} {} failed: {}", request.method(), request.uri(), detail);
				json!({
					"success": false,
					"message": "Storage failure",
				})
			},
			Error::Auth(err) => json!({
				"success": false,
				"message": err.to_string(),
			}),
			Error::BadRequest(message) => json!({
				"success": false,
				"message": message,
			}),
			Error::Config(detail) => {
				error!("{} {} failed: {}", request.method(), request.uri(), detail);
				json!({
					"success": false,
					"message": "Internal server error",
				})
			},
		};

		Response::build_from(Json(body).respond_to(request)?)
			.status(self.status())
			.ok()
	}
}
