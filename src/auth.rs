//! Token-based access control for the camera routes.
//!
//! `POST /auth/login` exchanges configured credentials for an HS256 JWT. Guarded
//! routes accept it as `Authorization: Bearer <token>` or as a `token` cookie.
//! When `auth.required` is off every request is let through.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::serde::json::{json, Value};
use rocket::Request;

use log::{info, warn};

use crate::error::{AuthError, Error};



pub const TOKEN_COOKIE: &str = "token";

#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
	pub required: bool,
	/// Signing secret; a random one is generated per process when unset.
	pub secret: Option<String>,
	pub token_ttl_hours: i64,
	pub login_url: String,
	pub users: Vec<UserCredentials>,
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfig {
			required: false,
			secret: None,
			token_ttl_hours: 24,
			login_url: "/auth/login".to_string(),
			users: Vec::new(),
		}
	}
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct UserCredentials {
	pub username: String,
	pub password: String,
	#[serde(default)]
	pub admin: bool,
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Claims {
	pub sub: String,
	pub admin: bool,
	pub exp: i64,
	pub iat: i64,
}

pub struct Authenticator {
	config: AuthConfig,
	secret: Vec<u8>,
	token_ttl: Duration,
}

impl Authenticator {
	/// Fails when `token_ttl_hours` is not a positive number of hours chrono
	/// can represent.
	pub fn new(config: AuthConfig) -> Result<Self, Error> {
		let token_ttl = Duration::try_hours(config.token_ttl_hours)
			.filter(|ttl| *ttl > Duration::zero())
			.ok_or_else(|| Error::Config(format!("auth.token_ttl_hours {} is out of range", config.token_ttl_hours)))?;

		let secret = match &config.secret {
			Some(secret) => secret.as_bytes().to_vec(),
			None => {
				if config.required {
					warn!("auth.secret is not set; issued tokens will not survive a restart");
				}
				rand::thread_rng().gen::<[u8; 32]>().to_vec()
			}
		};
		Ok(Authenticator { config, secret, token_ttl })
	}

	pub fn required(&self) -> bool {
		self.config.required
	}

	pub fn login_url(&self) -> &str {
		&self.config.login_url
	}

	/// Checks credentials against the configured users and issues a token.
	pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
		let user = self.config.users.iter()
			.find(|user| user.username == username && user.password == password)
			.ok_or_else(|| {
				warn!("Rejected login for {:?}", username);
				AuthError::InvalidCredentials
			})?;
		info!("Issued token for {}", user.username);
		self.issue_token(user)
	}

	pub fn issue_token(&self, user: &UserCredentials) -> Result<String, AuthError> {
		let now = Utc::now();
		let expires = now.checked_add_signed(self.token_ttl).ok_or(AuthError::Invalid)?;
		let claims = Claims {
			sub: user.username.clone(),
			admin: user.admin,
			exp: expires.timestamp(),
			iat: now.timestamp(),
		};

		encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(&self.secret))
			.map_err(|_| AuthError::Invalid)
	}

	pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
		// Only HS256 is accepted, whatever the token header claims.
		let mut validation = Validation::new(Algorithm::HS256);
		validation.set_required_spec_claims(&["exp", "sub", "iat"]);
		validation.leeway = 0;

		decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
			.map(|data| data.claims)
			.map_err(|err| match err.kind() {
				jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
				_ => AuthError::Invalid,
			})
	}
}



/// Request guard for protected routes. Holds the verified claims, or `None`
/// when authentication is switched off.
pub struct Authorized(pub Option<Claims>);

impl Authorized {
	pub fn user(&self) -> &str {
		self.0.as_ref().map_or("anonymous", |claims| claims.sub.as_str())
	}
}

/// Why the last guard on this request failed, read back by the 401 catcher.
struct RejectionReason(Option<AuthError>);

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<String> {
	let from_header = request.headers()
		.get_one("Authorization")
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(|token| token.trim().to_string());
	from_header.or_else(|| request.cookies().get(TOKEN_COOKIE).map(|cookie| cookie.value().to_string()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authorized {
	type Error = AuthError;

	async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
		let authenticator = match request.rocket().state::<Authenticator>() {
			Some(authenticator) => authenticator,
			None => return Outcome::Error((Status::InternalServerError, AuthError::Invalid)),
		};
		if !authenticator.required() {
			return Outcome::Success(Authorized(None));
		}

		let result = match bearer_token(request) {
			Some(token) => authenticator.verify_token(&token),
			None => Err(AuthError::Missing),
		};
		match result {
			Ok(claims) => Outcome::Success(Authorized(Some(claims))),
			Err(err) => {
				request.local_cache(|| RejectionReason(Some(err)));
				Outcome::Error((Status::Unauthorized, err))
			}
		}
	}
}

#[derive(Responder)]
pub enum AuthRejection {
	Redirect(Redirect),
	#[response(status = 401)]
	Unauthorized(Value),
}

/// Browsers are sent to the login entry point; API clients get a JSON body
/// pointing at it.
#[catch(401)]
pub fn unauthorized(request: &Request) -> AuthRejection {
	let login_url = request.rocket()
		.state::<Authenticator>()
		.map(|authenticator| authenticator.login_url().to_string())
		.unwrap_or_else(|| AuthConfig::default().login_url);

	let wants_html = request.accept()
		.map_or(false, |accept| accept.preferred().media_type().is_html());
	if wants_html {
		return AuthRejection::Redirect(Redirect::to(login_url));
	}

	let reason = request.local_cache(|| RejectionReason(None)).0.unwrap_or(AuthError::Missing);
	AuthRejection::Unauthorized(json!({
		"success": false,
		"message": reason.to_string(),
		"login": login_url,
	}))
}
