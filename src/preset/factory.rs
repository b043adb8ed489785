//! Read-only factory presets.
//!
//! Factory presets arrive as JSON from a [`FactorySource`], either as a flat
//! array of preset records or as an object partitioned by generator type:
//!
//! ```json
//! { "lorenz": [ { "name": "Classic", "isDefault": true, "parameters": { "rho": 28 } } ] }
//! ```
//!
//! [`FactoryPresets`] parses, normalises and caches the result. Only
//! successful loads are cached; a failed fetch is retried on the next call.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

use super::PatternPreset;
use crate::error::{PatternError, Result};

/// Presets compiled into the crate.
const BUNDLED_JSON: &str = include_str!("../../presets/factory.json");

/// Somewhere factory preset JSON can be fetched from.
pub trait FactorySource {
    fn fetch(&self) -> impl Future<Output = Result<String>>;
}

/// The preset bundle shipped inside the crate.
#[derive(Clone, Copy, Debug)]
pub struct BundledFactoryPresets {
    json: &'static str,
}

impl BundledFactoryPresets {
    pub fn new() -> Self {
        Self { json: BUNDLED_JSON }
    }

    /// Use a different static bundle.
    pub fn from_static(json: &'static str) -> Self {
        Self { json }
    }
}

impl Default for BundledFactoryPresets {
    fn default() -> Self {
        Self::new()
    }
}

impl FactorySource for BundledFactoryPresets {
    async fn fetch(&self) -> Result<String> {
        Ok(self.json.to_string())
    }
}

/// A preset bundle read from disk on each fetch.
#[derive(Clone, Debug)]
pub struct FileFactoryPresets {
    path: PathBuf,
}

impl FileFactoryPresets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FactorySource for FileFactoryPresets {
    async fn fetch(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| PatternError::FactoryUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FactoryBundle {
    Flat(Vec<PatternPreset>),
    Partitioned(BTreeMap<String, Vec<PatternPreset>>),
}

/// Parse factory preset JSON into normalised presets.
///
/// Every record is flagged `is_factory`, never `is_user_default`, gets its
/// generator type from the partition key when omitted, and gets a stable id
/// and content hash when missing.
pub fn parse_factory_bundle(json: &str) -> Result<Vec<PatternPreset>> {
    let bundle: FactoryBundle = serde_json::from_str(json)?;
    let presets = match bundle {
        FactoryBundle::Flat(presets) => presets,
        FactoryBundle::Partitioned(groups) => groups
            .into_iter()
            .flat_map(|(generator_type, presets)| {
                presets.into_iter().map(move |mut preset| {
                    if preset.generator_type.is_empty() {
                        preset.generator_type = generator_type.clone();
                    }
                    preset
                })
            })
            .collect(),
    };

    Ok(presets
        .into_iter()
        .map(|mut preset| {
            preset.is_factory = true;
            preset.is_user_default = false;
            if preset.id.is_empty() {
                preset.id = format!("factory-{}-{}", preset.generator_type, slug(&preset.name));
            }
            preset.ensure_hash();
            preset
        })
        .collect())
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// Cached factory presets from a [`FactorySource`].
#[derive(Debug)]
pub struct FactoryPresets<F> {
    source: F,
    cache: Mutex<Option<Arc<Vec<PatternPreset>>>>,
}

impl<F: FactorySource> FactoryPresets<F> {
    pub fn new(source: F) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    /// All factory presets, fetching and parsing on first use.
    pub async fn load(&self) -> Result<Arc<Vec<PatternPreset>>> {
        if let Some(cached) = self.lock().as_ref() {
            log::debug!("Factory presets served from cache");
            return Ok(Arc::clone(cached));
        }

        let json = self.source.fetch().await?;
        let presets = Arc::new(parse_factory_bundle(&json)?);
        log::debug!("Loaded {} factory presets", presets.len());
        *self.lock() = Some(Arc::clone(&presets));
        Ok(presets)
    }

    /// All factory presets, or an empty list if they cannot be loaded.
    pub async fn load_or_empty(&self) -> Arc<Vec<PatternPreset>> {
        match self.load().await {
            Ok(presets) => presets,
            Err(e) => {
                log::warn!("Factory presets unavailable: {}", e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Factory presets for one generator type.
    pub async fn presets_for(&self, generator_type: &str) -> Result<Vec<PatternPreset>> {
        Ok(self
            .load()
            .await?
            .iter()
            .filter(|p| p.generator_type == generator_type)
            .cloned()
            .collect())
    }

    /// The factory default for a generator type, if the bundle marks one.
    pub async fn default_for(&self, generator_type: &str) -> Result<Option<PatternPreset>> {
        Ok(self
            .load()
            .await?
            .iter()
            .find(|p| p.generator_type == generator_type && p.is_default)
            .cloned())
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    pub fn is_cached(&self) -> bool {
        self.lock().is_some()
    }

    /// Forget the cached bundle; the next load fetches again.
    pub fn clear_cache(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Vec<PatternPreset>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
