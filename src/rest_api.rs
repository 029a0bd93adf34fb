use std::path::PathBuf;

use rocket::fairing::AdHoc;
use rocket::response::status::Created;
use rocket::serde::json::{json, Json, Value};
use rocket::{Request, State};

use log::{error, info};

use crate::auth::{self, AuthConfig, Authenticator, Authorized};
use crate::common::{CameraId, CameraStatus};
use crate::error::{Error, Result};
use crate::geo::{self, BoundingBox};
use crate::store::{CameraFilter, CameraStore};
use crate::validation::{self, CameraCandidate};



/// Application settings read from the Rocket figment.
#[derive(Clone)]
#[derive(Debug, Default)]
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
	/// YAML file holding the camera collection; the collection lives in memory when unset.
	pub cameras_file: Option<PathBuf>,
	pub auth: AuthConfig,
}

#[derive(Deserialize)]
struct LoginRequest {
	username: String,
	password: String,
}



/// Query string accepted by `GET /cameras`.
#[derive(Debug)]
#[derive(FromForm)]
struct ListQuery {
	status: Option<String>,
	bbox: Option<String>,
	near: Option<String>,
	#[field(name = "maxDistance")]
	max_distance: Option<String>,
	q: Option<String>,
}

impl ListQuery {
	fn into_filter(self) -> Result<CameraFilter> {
		let status = self.status
			.map(|value| value.parse::<CameraStatus>()
				.map_err(|_| Error::BadRequest(format!("unknown status \"{}\"", value))))
			.transpose()?;
		let bbox = self.bbox
			.map(|value| value.parse::<BoundingBox>().map_err(Error::BadRequest))
			.transpose()?;
		let near = self.near
			.map(|value| geo::parse_point(&value).map_err(Error::BadRequest))
			.transpose()?;

		let max_distance = match self.max_distance {
			None => None,
			Some(_) if near.is_none() => {
				return Err(Error::BadRequest("maxDistance requires near".to_string()));
			},
			Some(value) => match value.trim().parse::<f64>() {
				Ok(distance) if distance.is_finite() && distance >= 0.0 => Some(distance),
				_ => {
					return Err(Error::BadRequest("maxDistance must be a non-negative number of meters".to_string()));
				}
			},
		};

		Ok(CameraFilter {
			status,
			bbox,
			near,
			max_distance,
			text: self.q.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()),
		})
	}
}

/// Any segment that is not a number names a camera that cannot exist.
fn parse_id(id: &str) -> Result<CameraId> {
	id.parse().map_err(|_| Error::NotFound(id.to_string()))
}

#[get("/?<query..>")]
async fn list_cameras(query: ListQuery, store: &State<CameraStore>, _auth: Authorized) -> Result<Value> {
	let filter = query.into_filter()?;
	let cameras = store.list(&filter).await;
	Ok(json!({ "success": true, "data": cameras }))
}

#[get("/<id>")]
async fn get_camera(id: &str, store: &State<CameraStore>, _auth: Authorized) -> Result<Value> {
	let camera = store.get(parse_id(id)?).await?;
	Ok(json!({ "success": true, "data": camera }))
}

#[post("/", data="<candidate>")]
async fn new_camera(
	candidate: Json<Value>,
	store: &State<CameraStore>,
	auth: Authorized,
) -> Result<Created<Value>> {
	let candidate = CameraCandidate::from_json(candidate.into_inner())?;
	let camera = store.create(&candidate).await?;
	info!("Camera {} registered by {}", camera.id, auth.user());
	let location = format!("/cameras/{}", camera.id);
	Ok(Created::new(location).body(json!({ "success": true, "data": camera })))
}

/// Runs the validation rules without storing anything.
#[post("/validate", data="<candidate>")]
fn validate_camera(candidate: Json<Value>, _auth: Authorized) -> Result<Value> {
	let candidate = CameraCandidate::from_json(candidate.into_inner())?;
	let report = validation::validate(&candidate);
	Ok(json!({ "success": true, "data": report }))
}

#[delete("/<id>")]
async fn delete_camera(id: &str, store: &State<CameraStore>, auth: Authorized) -> Result<Value> {
	let camera = store.delete(parse_id(id)?).await?;
	info!("Camera {} removed by {}", camera.id, auth.user());
	Ok(json!({
		"success": true,
		"message": "Camera deleted",
		"data": camera,
	}))
}

#[post("/login", data="<credentials>")]
fn login(credentials: Json<LoginRequest>, authenticator: &State<Authenticator>) -> Result<Value> {
	let token = authenticator.login(&credentials.username, &credentials.password)?;
	Ok(json!({ "success": true, "token": token }))
}

#[get("/health")]
async fn health(store: &State<CameraStore>) -> Value {
	json!({ "success": true, "data": store.health().await })
}



#[catch(400)]
fn bad_request() -> Value {
	json!({
		"success": false,
		"message": "Malformed request."
	})
}

#[catch(404)]
fn not_found() -> Value {
	json!({
		"success": false,
		"message": "Resource was not found."
	})
}

#[catch(422)]
fn unprocessable(request: &Request) -> Value {
	json!({
		"success": false,
		"message": format!("Request body for {} could not be parsed.", request.uri().path())
	})
}

#[catch(500)]
fn internal_error() -> Value {
	json!({
		"success": false,
		"message": "Internal server error."
	})
}



pub fn stage() -> AdHoc {
	AdHoc::try_on_ignite("Camera registry", |rocket| async move {
		let config: AppConfig = match rocket.figment().extract() {
			Ok(config) => config,
			Err(err) => {
				error!("Invalid configuration: {}", err);
				return Err(rocket);
			}
		};

		let store = match CameraStore::open(config.cameras_file.clone()).await {
			Ok(store) => store,
			Err(err) => {
				error!("Failed to open camera collection: {}", err);
				return Err(rocket);
			}
		};

		let authenticator = match Authenticator::new(config.auth) {
			Ok(authenticator) => authenticator,
			Err(err) => {
				error!("{}", err);
				return Err(rocket);
			}
		};

		Ok(rocket
			.manage(store)
			.manage(authenticator)
			.register("/", catchers![bad_request, auth::unauthorized, not_found, unprocessable, internal_error])
			.mount("/cameras", routes![list_cameras, get_camera, new_camera, validate_camera, delete_camera])
			.mount("/auth", routes![login])
			.mount("/", routes![health]))
	})
}



#[cfg(test)]
mod tests {
	use rocket::http::{ContentType, Cookie, Header, Status};
	use rocket::local::asynchronous::Client;
	use rocket::serde::json::{json, Value};

	use crate::auth::{AuthConfig, UserCredentials};

	async fn client(auth: AuthConfig) -> Client {
		let figment = rocket::Config::figment()
			.merge(("log_level", "off"))
			.merge(("auth", auth));
		Client::tracked(crate::build(figment)).await.expect("valid rocket instance")
	}

	fn secured() -> AuthConfig {
		AuthConfig {
			required: true,
			secret: Some("integration-secret".to_string()),
			users: vec![UserCredentials {
				username: "operator".to_string(),
				password: "hunter2".to_string(),
				admin: false,
			}],
			..Default::default()
		}
	}

	fn gate_cam() -> Value {
		json!({
			"name": "Gate Cam",
			"description": "Main gate",
			"location": { "type": "Point", "coordinates": [77.5, 12.9] },
			"visionRange": 50
		})
	}

	async fn create(client: &Client, body: &Value) -> Value {
		let response = client.post("/cameras").json(body).dispatch().await;
		assert_eq!(response.status(), Status::Created);
		response.into_json::<Value>().await.unwrap()["data"].clone()
	}

	async fn list(client: &Client, uri: &str) -> Value {
		let response = client.get(uri.to_string()).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		response.into_json::<Value>().await.unwrap()["data"].clone()
	}

	#[rocket::async_test]
	async fn create_applies_defaults_and_can_be_fetched() {
		let client = client(AuthConfig::default()).await;
		let created = create(&client, &gate_cam()).await;
		assert_eq!(created["resolution"], "1920x1080");
		assert_eq!(created["status"], "active");
		assert_eq!(created["visionRange"], 50.0);

		let response = client.get(format!("/cameras/{}", created["id"])).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["success"], true);
		assert_eq!(body["data"], created);
	}

	#[rocket::async_test]
	async fn invalid_camera_reports_every_violation() {
		let client = client(AuthConfig::default()).await;
		let response = client.post("/cameras")
			.json(&json!({
				"name": "",
				"description": "x",
				"location": { "type": "Point", "coordinates": [200, 12.9] }
			}))
			.dispatch().await;
		assert_eq!(response.status(), Status::BadRequest);

		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["success"], false);
		let errors: Vec<String> = serde_json::from_value(body["errors"].clone()).unwrap();
		assert_eq!(errors.len(), 2);
		assert!(errors.iter().any(|e| e.starts_with("name")));
		assert!(errors.iter().any(|e| e.contains("longitude")));

		assert_eq!(list(&client, "/cameras").await, json!([]));
	}

	#[rocket::async_test]
	async fn validate_endpoint_does_not_store() {
		let client = client(AuthConfig::default()).await;
		let response = client.post("/cameras/validate").json(&json!({})).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let report = response.into_json::<Value>().await.unwrap()["data"].clone();
		assert_eq!(report["valid"], false);
		assert_eq!(report["errors"].as_array().unwrap().len(), 3);

		assert_eq!(list(&client, "/cameras").await, json!([]));
	}

	#[rocket::async_test]
	async fn malformed_body_gets_json_error() {
		let client = client(AuthConfig::default()).await;
		let response = client.post("/cameras")
			.header(ContentType::JSON)
			.body("{\"name\": 12")
			.dispatch().await;
		assert!(response.status() == Status::BadRequest || response.status() == Status::UnprocessableEntity);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["success"], false);
	}

	#[rocket::async_test]
	async fn delete_twice_is_not_found_the_second_time() {
		let client = client(AuthConfig::default()).await;
		let created = create(&client, &gate_cam()).await;
		let uri = format!("/cameras/{}", created["id"]);

		let response = client.delete(uri.as_str()).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		assert_eq!(response.into_json::<Value>().await.unwrap()["data"], created);

		assert_eq!(list(&client, "/cameras").await, json!([]));

		let response = client.delete(uri.as_str()).dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
		assert_eq!(client.get(uri.as_str()).dispatch().await.status(), Status::NotFound);
	}

	#[rocket::async_test]
	async fn non_numeric_id_is_not_found() {
		let client = client(AuthConfig::default()).await;
		create(&client, &gate_cam()).await;

		let response = client.get("/cameras/not-an-id").dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["success"], false);
		assert_eq!(body["message"], "Camera not found");

		let response = client.delete("/cameras/abc").dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
		assert_eq!(response.into_json::<Value>().await.unwrap()["success"], false);
		assert_eq!(list(&client, "/cameras").await.as_array().unwrap().len(), 1);
	}

	#[rocket::async_test]
	async fn wrong_field_types_are_reported_with_the_other_violations() {
		let client = client(AuthConfig::default()).await;
		let response = client.post("/cameras")
			.json(&json!({
				"name": "",
				"description": "x",
				"location": { "type": "Point", "coordinates": [200, 12.9] },
				"visionRange": "fifty"
			}))
			.dispatch().await;
		assert_eq!(response.status(), Status::BadRequest);
		let errors: Vec<String> = serde_json::from_value(response.into_json::<Value>().await.unwrap()["errors"].clone()).unwrap();
		assert_eq!(errors.len(), 3);
		assert!(errors.iter().any(|e| e == "name is required"));
		assert!(errors.iter().any(|e| e.contains("longitude")));
		assert!(errors.iter().any(|e| e == "visionRange must be a number"));

		let mut numeric_name = gate_cam();
		numeric_name["name"] = json!(5);
		let response = client.post("/cameras").json(&numeric_name).dispatch().await;
		assert_eq!(response.status(), Status::BadRequest);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["errors"], json!(["name must be a string"]));

		let response = client.post("/cameras/validate").json(&numeric_name).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		assert_eq!(response.into_json::<Value>().await.unwrap()["data"]["errors"], json!(["name must be a string"]));

		assert_eq!(list(&client, "/cameras").await, json!([]));
	}

	#[rocket::async_test]
	async fn vision_range_sent_as_string_is_accepted() {
		let client = client(AuthConfig::default()).await;
		let mut body = gate_cam();
		body["visionRange"] = json!("50");
		let created = create(&client, &body).await;
		assert_eq!(created["visionRange"], 50.0);
	}

	#[rocket::async_test]
	async fn out_of_range_token_ttl_fails_ignition() {
		let auth = AuthConfig { token_ttl_hours: i64::MAX, ..secured() };
		let figment = rocket::Config::figment()
			.merge(("log_level", "off"))
			.merge(("auth", auth));
		match Client::tracked(crate::build(figment)).await {
			Ok(_) => panic!("rocket ignited with an unusable token ttl"),
			Err(err) => assert!(matches!(err.kind(), rocket::error::ErrorKind::FailedFairings(_))),
		}
	}

	#[rocket::async_test]
	async fn list_filters_by_query_parameters() {
		let client = client(AuthConfig::default()).await;
		let gate = create(&client, &gate_cam()).await;
		let harbour = create(&client, &json!({
			"name": "Harbour",
			"description": "Pier 4",
			"location": { "type": "Point", "coordinates": [-0.1, 51.5] },
			"status": "inactive",
			"resolution": "3840x2160"
		})).await;

		assert_eq!(list(&client, "/cameras?status=inactive").await, json!([harbour.clone()]));
		assert_eq!(list(&client, "/cameras?bbox=77,12,78,13").await, json!([gate.clone()]));
		assert_eq!(list(&client, "/cameras?q=pier").await, json!([harbour.clone()]));
		assert_eq!(list(&client, "/cameras?near=-0.1,51.5&maxDistance=1000").await, json!([harbour.clone()]));
		assert_eq!(list(&client, "/cameras?near=77.5,12.9").await, json!([gate, harbour]));

		assert_eq!(client.get("/cameras?status=broken").dispatch().await.status(), Status::BadRequest);
		assert_eq!(client.get("/cameras?bbox=1,2,3").dispatch().await.status(), Status::BadRequest);
		assert_eq!(client.get("/cameras?maxDistance=5").dispatch().await.status(), Status::BadRequest);
		assert_eq!(client.get("/cameras?near=0,0&maxDistance=far").dispatch().await.status(), Status::BadRequest);
	}

	#[rocket::async_test]
	async fn protected_routes_require_a_token() {
		let client = client(secured()).await;

		let response = client.get("/cameras").dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["login"], "/auth/login");

		let response = client.get("/cameras").header(Header::new("Accept", "text/html")).dispatch().await;
		assert_eq!(response.status(), Status::SeeOther);
		assert_eq!(response.headers().get_one("Location"), Some("/auth/login"));

		let response = client.get("/cameras")
			.header(Header::new("Authorization", "Bearer garbage"))
			.dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);

		assert_eq!(client.get("/health").dispatch().await.status(), Status::Ok);
	}

	#[rocket::async_test]
	async fn login_token_unlocks_protected_routes() {
		let client = client(secured()).await;

		let response = client.post("/auth/login")
			.json(&json!({ "username": "operator", "password": "wrong" }))
			.dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);

		let response = client.post("/auth/login")
			.json(&json!({ "username": "operator", "password": "hunter2" }))
			.dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let token = response.into_json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();

		let response = client.post("/cameras")
			.header(Header::new("Authorization", format!("Bearer {}", token)))
			.json(&gate_cam())
			.dispatch().await;
		assert_eq!(response.status(), Status::Created);

		let response = client.get("/cameras")
			.cookie(Cookie::new("token", token))
			.dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let body = response.into_json::<Value>().await.unwrap();
		assert_eq!(body["data"].as_array().unwrap().len(), 1);
	}

	#[rocket::async_test]
	async fn health_reports_collection_size() {
		let client = client(AuthConfig::default()).await;
		create(&client, &gate_cam()).await;

		let body = client.get("/health").dispatch().await.into_json::<Value>().await.unwrap();
		assert_eq!(body["data"]["cameras"], 1);
		assert_eq!(body["data"]["backend"], "memory");
	}
}
