//! Spherical geometry for location queries.

use std::str::FromStr;

use crate::common::GeoPoint;



/// Earth radius used for spherical distances, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// A longitude/latitude rectangle. `west > east` describes a box that crosses
/// the antimeridian.
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct BoundingBox {
	pub west: f64,
	pub south: f64,
	pub east: f64,
	pub north: f64,
}

impl BoundingBox {
	pub fn contains(&self, point: &GeoPoint) -> bool {
		let (lon, lat) = (point.longitude(), point.latitude());
		if lat < self.south || lat > self.north {
			return false;
		}
		if self.west <= self.east {
			lon >= self.west && lon <= self.east
		} else {
			lon >= self.west || lon <= self.east
		}
	}
}

impl FromStr for BoundingBox {
	type Err = String;

	/// Parses `west,south,east,north`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let values = parse_numbers(s, 4)
			.ok_or_else(|| format!("bbox \"{}\" must be four numbers: west,south,east,north", s))?;
		let bbox = BoundingBox {
			west: values[0],
			south: values[1],
			east: values[2],
			north: values[3],
		};

		if !valid_longitude(bbox.west) || !valid_longitude(bbox.east) {
			return Err("bbox longitudes must be within [-180, 180]".to_string());
		}
		if !valid_latitude(bbox.south) || !valid_latitude(bbox.north) {
			return Err("bbox latitudes must be within [-90, 90]".to_string());
		}
		if bbox.south > bbox.north {
			return Err("bbox south must not exceed north".to_string());
		}
		Ok(bbox)
	}
}

/// Parses a `longitude,latitude` pair.
pub fn parse_point(s: &str) -> Result<GeoPoint, String> {
	let values = parse_numbers(s, 2)
		.ok_or_else(|| format!("point \"{}\" must be two numbers: longitude,latitude", s))?;
	if !valid_longitude(values[0]) || !valid_latitude(values[1]) {
		return Err(format!("point \"{}\" is outside the valid longitude/latitude range", s));
	}
	Ok(GeoPoint::new(values[0], values[1]))
}

/// Great-circle distance between two points using the haversine formula.
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
	let (lat1, lat2) = (a.latitude().to_radians(), b.latitude().to_radians());
	let d_lat = lat2 - lat1;
	let d_lon = (b.longitude() - a.longitude()).to_radians();

	let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
	2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

fn valid_longitude(value: f64) -> bool {
	(-180.0..=180.0).contains(&value)
}

fn valid_latitude(value: f64) -> bool {
	(-90.0..=90.0).contains(&value)
}

fn parse_numbers(s: &str, count: usize) -> Option<Vec<f64>> {
	let values = s.split(',')
		.map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
		.collect::<Option<Vec<f64>>>()?;
	if values.len() == count {
		Some(values)
	} else {
		None
	}
}
