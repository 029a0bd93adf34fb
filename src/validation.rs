//! Field-level rules for camera records.
//!
//! Submissions are read field by field from the JSON body, so a value of the
//! wrong type is reported together with every other problem instead of
//! rejecting the whole body.

use std::borrow::Cow;
use std::fmt;

use rocket::serde::json::Value;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::common::{
	Camera,
	CameraStatus,
	GeoPoint,
	NewCamera,
	Resolution,
	DEFAULT_VISION_RANGE,
};
use crate::error::{Error, Result};



const FIELD_ORDER: [&str; 8] = [
	"name",
	"description",
	"location",
	"location.type",
	"location.coordinates",
	"resolution",
	"visionRange",
	"status",
];

/// Camera as submitted by a client. Every field is optional so that validation
/// can report all missing fields at once instead of failing on the first one.
#[derive(Clone)]
#[derive(Debug, Default)]
#[derive(Validate)]
pub struct CameraCandidate {
	#[validate(required(message = "is required"), custom(function = "not_blank"))]
	pub name: Option<String>,
	#[validate(required(message = "is required"), custom(function = "not_blank"))]
	pub description: Option<String>,
	#[validate(required(message = "is required"), nested)]
	pub location: Option<LocationCandidate>,
	#[validate(custom(function = "known_resolution"))]
	pub resolution: Option<String>,
	#[validate(range(min = 1.0, message = "must be at least 1 meter"), custom(function = "finite_number"))]
	pub vision_range: Option<f64>,
	#[validate(custom(function = "known_status"))]
	pub status: Option<String>,
	/// Fields that were present but of an unusable JSON type.
	pub type_errors: Vec<Violation>,
}

#[derive(Clone)]
#[derive(Debug, Default)]
#[derive(Serialize)]
#[derive(Validate)]
pub struct LocationCandidate {
	#[validate(custom(function = "point_type"))]
	pub kind: Option<String>,
	#[validate(required(message = "must be exactly [longitude, latitude]"), custom(function = "coordinate_pair"))]
	pub coordinates: Option<Vec<f64>>,
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub struct Violation {
	/// Wire name of the field, dotted for nested ones.
	pub field: String,
	pub message: String,
}

impl Violation {
	fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
		Violation { field: field.into(), message: message.into() }
	}
}

impl fmt::Display for Violation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.field, self.message)
	}
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize)]
pub struct ValidationReport {
	pub valid: bool,
	pub errors: Vec<String>,
}



impl CameraCandidate {
	/// Reads a submission out of a JSON body. Only a body that is not an
	/// object at all is refused here, field type problems are kept for
	/// [`validate`] to report.
	pub fn from_json(body: Value) -> Result<Self> {
		let mut fields = match body {
			Value::Object(fields) => fields,
			_ => return Err(Error::BadRequest("camera must be a JSON object".to_string())),
		};

		let mut type_errors = Vec::new();
		let name = text_field(fields.remove("name"), "name", &mut type_errors);
		let description = text_field(fields.remove("description"), "description", &mut type_errors);
		let location = match fields.remove("location") {
			None | Some(Value::Null) => None,
			Some(Value::Object(mut location)) => Some(LocationCandidate {
				kind: text_field(location.remove("type"), "location.type", &mut type_errors),
				coordinates: coordinates_field(location.remove("coordinates"), &mut type_errors),
			}),
			Some(_) => {
				type_errors.push(Violation::new("location", "must be a GeoJSON Point object"));
				None
			},
		};
		let resolution = text_field(fields.remove("resolution"), "resolution", &mut type_errors);
		let vision_range = match fields.remove("visionRange") {
			None | Some(Value::Null) => None,
			Some(value) => {
				let range = number(&value);
				if range.is_none() {
					type_errors.push(Violation::new("visionRange", "must be a number"));
				}
				range
			},
		};
		let status = text_field(fields.remove("status"), "status", &mut type_errors);

		Ok(CameraCandidate { name, description, location, resolution, vision_range, status, type_errors })
	}
}

impl From<&Camera> for CameraCandidate {
	fn from(camera: &Camera) -> Self {
		CameraCandidate {
			name: Some(camera.name.clone()),
			description: Some(camera.description.clone()),
			location: Some(LocationCandidate {
				kind: Some("Point".to_string()),
				coordinates: Some(camera.location.coordinates.to_vec()),
			}),
			resolution: Some(camera.resolution.to_string()),
			vision_range: Some(camera.vision_range),
			status: Some(camera.status.to_string()),
			type_errors: Vec::new(),
		}
	}
}

fn text_field(value: Option<Value>, field: &str, type_errors: &mut Vec<Violation>) -> Option<String> {
	match value {
		None | Some(Value::Null) => None,
		Some(Value::String(text)) => Some(text),
		Some(_) => {
			type_errors.push(Violation::new(field, "must be a string"));
			None
		},
	}
}

fn coordinates_field(value: Option<Value>, type_errors: &mut Vec<Violation>) -> Option<Vec<f64>> {
	let coordinates = match value {
		None | Some(Value::Null) => return None,
		Some(Value::Array(items)) => items.iter().map(number).collect::<Option<Vec<f64>>>(),
		Some(_) => None,
	};
	if coordinates.is_none() {
		type_errors.push(Violation::new("location.coordinates", "must be an array of numbers"));
	}
	coordinates
}

/// Numbers may also arrive as numeric strings, as HTML form clients send them.
fn number(value: &Value) -> Option<f64> {
	match value {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
		_ => None,
	}
}



fn invalid(code: &'static str, message: String) -> ValidationError {
	ValidationError::new(code).with_message(Cow::Owned(message))
}

#[allow(clippy::ptr_arg)]
fn not_blank(value: &String) -> std::result::Result<(), ValidationError> {
	if value.trim().is_empty() {
		return Err(invalid("blank", "is required".to_string()));
	}
	Ok(())
}

#[allow(clippy::ptr_arg)]
fn point_type(value: &String) -> std::result::Result<(), ValidationError> {
	if value != "Point" {
		return Err(invalid("geometry", format!("must be \"Point\", got \"{}\"", value)));
	}
	Ok(())
}

#[allow(clippy::ptr_arg)]
fn coordinate_pair(value: &Vec<f64>) -> std::result::Result<(), ValidationError> {
	let (longitude, latitude) = match value.as_slice() {
		[longitude, latitude] => (*longitude, *latitude),
		_ => return Err(invalid("shape", "must be exactly [longitude, latitude]".to_string())),
	};

	let mut problems = Vec::new();
	if !(-180.0..=180.0).contains(&longitude) {
		problems.push(format!("longitude {} is outside [-180, 180]", longitude));
	}
	if !(-90.0..=90.0).contains(&latitude) {
		problems.push(format!("latitude {} is outside [-90, 90]", latitude));
	}
	if !problems.is_empty() {
		return Err(invalid("range", problems.join(", ")));
	}
	Ok(())
}

#[allow(clippy::ptr_arg)]
fn known_resolution(value: &String) -> std::result::Result<(), ValidationError> {
	if value.parse::<Resolution>().is_err() {
		let allowed: Vec<&str> = Resolution::ALL.iter().map(|r| r.as_str()).collect();
		return Err(invalid("resolution", format!("\"{}\" is not one of {}", value, allowed.join(", "))));
	}
	Ok(())
}

#[allow(clippy::ptr_arg)]
fn known_status(value: &String) -> std::result::Result<(), ValidationError> {
	if value.parse::<CameraStatus>().is_err() {
		let allowed: Vec<&str> = CameraStatus::ALL.iter().map(|s| s.as_str()).collect();
		return Err(invalid("status", format!("\"{}\" is not one of {}", value, allowed.join(", "))));
	}
	Ok(())
}

fn finite_number(value: f64) -> std::result::Result<(), ValidationError> {
	if !value.is_finite() {
		return Err(invalid("finite", "must be a finite number".to_string()));
	}
	Ok(())
}



fn wire_name(field: &str) -> &str {
	match field {
		"vision_range" => "visionRange",
		"kind" => "type",
		other => other,
	}
}

fn collect(prefix: Option<&str>, errors: &ValidationErrors, found: &mut Vec<Violation>) {
	for (field, kind) in errors.errors() {
		let field = field.to_string();
		let path = match prefix {
			Some(prefix) => format!("{}.{}", prefix, wire_name(&field)),
			None => wire_name(&field).to_string(),
		};
		match kind {
			ValidationErrorsKind::Field(errors) => {
				for error in errors {
					let message = error.message.as_ref()
						.map_or_else(|| error.code.to_string(), |message| message.to_string());
					found.push(Violation::new(path.clone(), message));
				}
			},
			ValidationErrorsKind::Struct(inner) => collect(Some(&path), inner, found),
			ValidationErrorsKind::List(items) => {
				for inner in items.values() {
					collect(Some(&path), inner, found);
				}
			},
		}
	}
}

fn field_rank(field: &str) -> usize {
	FIELD_ORDER.iter().position(|known| *known == field).unwrap_or(FIELD_ORDER.len())
}

fn violations(candidate: &CameraCandidate) -> Vec<String> {
	let mut found = candidate.type_errors.clone();
	if let Err(errors) = candidate.validate() {
		let mut reported = Vec::new();
		collect(None, &errors, &mut reported);
		// A field with the wrong type is already reported, do not also call it missing.
		reported.retain(|violation| !candidate.type_errors.iter().any(|t| t.field == violation.field));
		found.extend(reported);
	}
	found.sort_by_key(|violation| field_rank(&violation.field));
	found.iter().map(ToString::to_string).collect()
}

pub fn validate(candidate: &CameraCandidate) -> ValidationReport {
	let errors = violations(candidate);
	ValidationReport { valid: errors.is_empty(), errors }
}

/// Validates `candidate` and, when it is acceptable, returns it with defaults applied.
pub fn check(candidate: &CameraCandidate) -> Result<NewCamera> {
	let errors = violations(candidate);
	if !errors.is_empty() {
		return Err(Error::Validation(errors));
	}

	let coordinates = candidate.location.as_ref().and_then(|location| location.coordinates.as_deref());
	match (candidate.name.as_deref(), candidate.description.as_deref(), coordinates) {
		(Some(name), Some(description), Some([longitude, latitude])) => Ok(NewCamera {
			name: name.trim().to_string(),
			description: description.trim().to_string(),
			location: GeoPoint::new(*longitude, *latitude),
			resolution: candidate.resolution.as_deref()
				.and_then(|resolution| resolution.parse().ok())
				.unwrap_or_default(),
			vision_range: candidate.vision_range.unwrap_or(DEFAULT_VISION_RANGE),
			status: candidate.status.as_deref()
				.and_then(|status| status.parse().ok())
				.unwrap_or_default(),
		}),
		_ => Err(Error::Validation(vec!["location is required".to_string()])),
	}
}

/// Re-checks a record read back from the collection file.
pub fn check_stored(camera: &Camera) -> std::result::Result<(), Vec<String>> {
	let errors = violations(&CameraCandidate::from(camera));
	if errors.is_empty() {
		return Ok(());
	}
	Err(errors)
}
