use std::cmp;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use log::{info, warn};

use crate::common::{Camera, CameraId, CameraList, CameraMap, CameraStatus, GeoPoint};
use crate::error::{Error, Result};
use crate::geo::{self, BoundingBox};
use crate::validation::{self, CameraCandidate};



/// Contents of the collection file.
#[derive(Clone)]
#[derive(Debug, Default)]
#[derive(Serialize, Deserialize)]
struct CameraDocument {
	#[serde(default)]
	next_id: CameraId,
	#[serde(default)]
	cameras: CameraMap,
}

#[derive(Clone)]
#[derive(Debug, Default)]
pub struct CameraFilter {
	pub status: Option<CameraStatus>,
	pub bbox: Option<BoundingBox>,
	pub near: Option<GeoPoint>,
	/// Only honoured together with `near`.
	pub max_distance: Option<f64>,
	pub text: Option<String>,
}

impl CameraFilter {
	fn matches(&self, camera: &Camera) -> bool {
		if let Some(status) = self.status {
			if camera.status != status {
				return false;
			}
		}
		if let Some(bbox) = &self.bbox {
			if !bbox.contains(&camera.location) {
				return false;
			}
		}
		if let Some(text) = &self.text {
			let needle = text.to_lowercase();
			if !camera.name.to_lowercase().contains(&needle)
				&& !camera.description.to_lowercase().contains(&needle) {
				return false;
			}
		}
		true
	}
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Serialize)]
pub struct StoreHealth {
	pub cameras: usize,
	pub backend: &'static str,
	pub path: Option<String>,
}

/// The camera collection. Reads share the lock; every mutation holds the write
/// lock until the collection file has been rewritten, so the file never lags
/// behind an acknowledged write.
pub struct CameraStore {
	path: Option<PathBuf>,
	// Using tokio::sync::RwLock so that readers don't block each other and a
	// writer waiting for the lock isn't starved by new readers.
	document: RwLock<CameraDocument>,
}

impl CameraStore {
	pub fn in_memory() -> Self {
		CameraStore {
			path: None,
			document: RwLock::new(CameraDocument::default()),
		}
	}

	/// Opens the collection stored at `path`, or an in-memory collection when no
	/// path is given. A file that does not exist yet is treated as empty.
	pub async fn open(path: Option<PathBuf>) -> Result<Self> {
		let document = match &path {
			Some(path) => read_collection_file(path).await?,
			None => return Ok(CameraStore::in_memory()),
		};
		Ok(CameraStore {
			path,
			document: RwLock::new(document),
		})
	}

	pub async fn create(&self, candidate: &CameraCandidate) -> Result<Camera> {
		let new_camera = validation::check(candidate)?;

		let mut document = self.document.write().await;
		let id = next_camera_id(&document);
		let camera = new_camera.into_camera(id, Utc::now());
		let previous_next_id = document.next_id;
		document.cameras.insert(id, camera.clone());
		document.next_id = id + 1;

		if let Err(err) = self.persist(&document).await {
			document.cameras.remove(&id);
			document.next_id = previous_next_id;
			return Err(err);
		}
		info!("Created camera {} ({})", id, camera.name);
		Ok(camera)
	}

	pub async fn list(&self, filter: &CameraFilter) -> CameraList {
		let document = self.document.read().await;
		let matching = document.cameras.values().filter(|camera| filter.matches(camera));

		match &filter.near {
			None => matching.cloned().collect(),
			Some(origin) => {
				let mut by_distance: Vec<(f64, &Camera)> = matching
					.map(|camera| (geo::distance_meters(origin, &camera.location), camera))
					.filter(|(distance, _)| filter.max_distance.map_or(true, |max| *distance <= max))
					.collect();
				by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
				by_distance.into_iter().map(|(_, camera)| camera.clone()).collect()
			}
		}
	}

	pub async fn get(&self, id: CameraId) -> Result<Camera> {
		let document = self.document.read().await;
		document.cameras.get(&id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
	}

	pub async fn delete(&self, id: CameraId) -> Result<Camera> {
		let mut document = self.document.write().await;
		let camera = document.cameras.remove(&id).ok_or_else(|| Error::NotFound(id.to_string()))?;

		if let Err(err) = self.persist(&document).await {
			document.cameras.insert(id, camera);
			return Err(err);
		}
		info!("Deleted camera {} ({})", id, camera.name);
		Ok(camera)
	}

	pub async fn health(&self) -> StoreHealth {
		let document = self.document.read().await;
		StoreHealth {
			cameras: document.cameras.len(),
			backend: if self.path.is_some() { "file" } else { "memory" },
			path: self.path.as_ref().map(|path| path.display().to_string()),
		}
	}

	async fn persist(&self, document: &CameraDocument) -> Result<()> {
		match &self.path {
			Some(path) => write_collection_file(path, document).await,
			None => Ok(()),
		}
	}
}

/// Ids are never reused, even after the highest one was deleted.
fn next_camera_id(document: &CameraDocument) -> CameraId {
	let mut highest_id : CameraId = 0;
	for id in document.cameras.keys() {
		highest_id = cmp::max(highest_id, *id);
	}
	cmp::max(highest_id + 1, document.next_id)
}

async fn read_collection_file(path: &Path) -> Result<CameraDocument> {
	match tokio::fs::read(path).await {
		Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(CameraDocument::default()),
		Ok(bytes) => {
			let document: CameraDocument = serde_yaml::from_slice(&bytes)
				.map_err(|err| Error::Storage(format!("failed to parse {}: {}", path.display(), err)))?;
			verify_document(&document)
				.map_err(|detail| Error::Storage(format!("invalid camera in {}: {}", path.display(), detail)))?;
			info!("Loaded {} cameras from {}", document.cameras.len(), path.display());
			Ok(document)
		},
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
			// First run, the file is created on the first write.
			warn!("Camera file {} does not exist yet; starting with an empty collection", path.display());
			Ok(CameraDocument::default())
		},
		Err(err) => Err(Error::Storage(format!("failed to read {}: {}", path.display(), err))),
	}
}

/// The file may have been edited by hand, so records get the same checks as
/// submissions and each key must match the embedded id.
fn verify_document(document: &CameraDocument) -> std::result::Result<(), String> {
	for (key, camera) in &document.cameras {
		if *key != camera.id {
			return Err(format!("entry {} holds camera id {}", key, camera.id));
		}
		if let Err(errors) = validation::check_stored(camera) {
			return Err(format!("camera {}: {}", camera.id, errors.join("; ")));
		}
	}
	Ok(())
}

async fn write_collection_file(path: &Path, document: &CameraDocument) -> Result<()> {
	let yaml = serde_yaml::to_string(document)?;

	let temp_path = path.with_extension("tmp");
	let file = tokio::fs::File::create(&temp_path).await?;
	let mut writer = tokio::io::BufWriter::new(file);
	writer.write_all(yaml.as_bytes()).await?;
	writer.flush().await?;
	writer.into_inner().sync_all().await?;

	tokio::fs::rename(&temp_path, path).await?;
	Ok(())
}
