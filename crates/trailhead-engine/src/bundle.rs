//! Content bundle loading.
//!
//! A bundle is the JSON file a game's authoring tool exports. Either an
//! object `{ "slug": ..., "features": [...] }` or a bare feature array is
//! accepted. Features that fail to decode (an unknown media type, a
//! missing field) or cannot be evaluated (non-finite coordinates,
//! non-positive radius, duplicate ids) are skipped with a warning rather
//! than failing the whole game.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use trailhead_types::{GeofenceFeature, Slug};

use crate::error::EngineError;

/// The playable content of one game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentBundle {
    /// Slug declared by the bundle, if any.
    pub slug: Option<Slug>,
    /// Geofence features in authoring order.
    pub features: Vec<GeofenceFeature>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBundle {
    Features(Vec<Value>),
    Object {
        #[serde(default)]
        slug: Option<Slug>,
        #[serde(default)]
        features: Vec<Value>,
    },
}

impl ContentBundle {
    /// Read and parse a bundle file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::Bundle {
            path: path.to_path_buf(),
            message: format!("failed to read: {e}"),
        })?;
        let bundle = Self::parse(&raw).map_err(|message| EngineError::Bundle {
            path: path.to_path_buf(),
            message,
        })?;
        info!(
            path = %path.display(),
            features = bundle.features.len(),
            "content bundle loaded"
        );
        Ok(bundle)
    }

    /// Parse bundle JSON, dropping unusable features.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (slug, features) = match serde_json::from_str::<RawBundle>(raw)
            .map_err(|e| format!("invalid bundle JSON: {e}"))?
        {
            RawBundle::Object { slug, features } => (slug, features),
            RawBundle::Features(features) => (None, features),
        };

        let mut seen = HashSet::new();
        let features = features
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| decode_feature(index, raw))
            .filter(|f| {
                let usable = f.coordinates.lat.is_finite()
                    && f.coordinates.lng.is_finite()
                    && f.radius_meters.is_finite()
                    && f.radius_meters > 0.0;
                if !usable {
                    warn!(feature = %f.id, radius_m = f.radius_meters, "skipping feature with unusable geometry");
                    return false;
                }
                if !seen.insert(f.id.clone()) {
                    warn!(feature = %f.id, "skipping duplicate feature id");
                    return false;
                }
                true
            })
            .collect();

        Ok(Self { slug, features })
    }
}

fn decode_feature(index: usize, raw: Value) -> Option<GeofenceFeature> {
    let id = raw.get("id").and_then(Value::as_str).unwrap_or("?").to_owned();
    serde_json::from_value(raw)
        .inspect_err(|e| warn!(index, feature = %id, error = %e, "skipping undecodable feature"))
        .ok()
}
