use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};



pub type CameraId = u64;
pub type CameraList = Vec<Camera>;
pub type CameraMap = BTreeMap<CameraId, Camera>;

pub const DEFAULT_VISION_RANGE: f64 = 100.0;

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
	pub id: CameraId,
	pub name: String,
	pub description: String,
	pub location: GeoPoint,
	pub resolution: Resolution,
	pub vision_range: f64,
	pub status: CameraStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A validated camera that has not been assigned an id yet.
#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub struct NewCamera {
	pub name: String,
	pub description: String,
	pub location: GeoPoint,
	pub resolution: Resolution,
	pub vision_range: f64,
	pub status: CameraStatus,
}

impl NewCamera {
	pub fn into_camera(self, id: CameraId, now: DateTime<Utc>) -> Camera {
		Camera {
			id,
			name: self.name,
			description: self.description,
			location: self.location,
			resolution: self.resolution,
			vision_range: self.vision_range,
			status: self.status,
			created_at: now,
			updated_at: now,
		}
	}
}



#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum PointType {
	Point,
}

/// GeoJSON point, `coordinates` is always `[longitude, latitude]`.
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct GeoPoint {
	#[serde(rename = "type")]
	pub kind: PointType,
	pub coordinates: [f64; 2],
}

impl GeoPoint {
	pub fn new(longitude: f64, latitude: f64) -> Self {
		GeoPoint {
			kind: PointType::Point,
			coordinates: [longitude, latitude],
		}
	}

	pub fn longitude(&self) -> f64 {
		self.coordinates[0]
	}

	pub fn latitude(&self) -> f64 {
		self.coordinates[1]
	}
}



#[derive(Clone, Copy)]
#[derive(Debug, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum Resolution {
	#[serde(rename = "640x480")]
	Vga,
	#[serde(rename = "800x600")]
	Svga,
	#[serde(rename = "1024x768")]
	Xga,
	#[serde(rename = "1280x720")]
	Hd720,
	#[serde(rename = "1366x768")]
	Hd,
	#[serde(rename = "1600x900")]
	HdPlus,
	#[serde(rename = "1920x1080")]
	#[default]
	FullHd,
	#[serde(rename = "1920x1200")]
	Wuxga,
	#[serde(rename = "2560x1440")]
	Qhd,
	#[serde(rename = "2560x1600")]
	Wqxga,
	#[serde(rename = "3200x1800")]
	QhdPlus,
	#[serde(rename = "3840x2160")]
	Uhd4k,
	#[serde(rename = "4096x2160")]
	Dci4k,
}

impl Resolution {
	pub const ALL: [Resolution; 13] = [
		Resolution::Vga,
		Resolution::Svga,
		Resolution::Xga,
		Resolution::Hd720,
		Resolution::Hd,
		Resolution::HdPlus,
		Resolution::FullHd,
		Resolution::Wuxga,
		Resolution::Qhd,
		Resolution::Wqxga,
		Resolution::QhdPlus,
		Resolution::Uhd4k,
		Resolution::Dci4k,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Resolution::Vga => "640x480",
			Resolution::Svga => "800x600",
			Resolution::Xga => "1024x768",
			Resolution::Hd720 => "1280x720",
			Resolution::Hd => "1366x768",
			Resolution::HdPlus => "1600x900",
			Resolution::FullHd => "1920x1080",
			Resolution::Wuxga => "1920x1200",
			Resolution::Qhd => "2560x1440",
			Resolution::Wqxga => "2560x1600",
			Resolution::QhdPlus => "3200x1800",
			Resolution::Uhd4k => "3840x2160",
			Resolution::Dci4k => "4096x2160",
		}
	}
}

impl fmt::Display for Resolution {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Resolution {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Resolution::ALL.iter()
			.find(|resolution| resolution.as_str() == s)
			.copied()
			.ok_or(())
	}
}



#[derive(Clone, Copy)]
#[derive(Debug, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
	#[default]
	Active,
	Inactive,
	Maintenance,
}

impl CameraStatus {
	pub const ALL: [CameraStatus; 3] = [
		CameraStatus::Active,
		CameraStatus::Inactive,
		CameraStatus::Maintenance,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			CameraStatus::Active => "active",
			CameraStatus::Inactive => "inactive",
			CameraStatus::Maintenance => "maintenance",
		}
	}
}

impl fmt::Display for CameraStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CameraStatus {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		CameraStatus::ALL.iter()
			.find(|status| status.as_str() == s)
			.copied()
			.ok_or(())
	}
}
