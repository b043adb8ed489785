//! User preset persistence.
//!
//! The store only ever removes a record when asked to: [`delete_preset`],
//! [`purge_factory_copies`] and [`discard_unparsed_records`]. Records that
//! fail to parse are hidden from readers but carried through every write
//! unchanged.
//!
//! [`delete_preset`]: PresetStore::delete_preset
//! [`purge_factory_copies`]: PresetStore::purge_factory_copies
//! [`discard_unparsed_records`]: PresetStore::discard_unparsed_records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::storage::Storage;
use super::{content_hash, ParamMap, PatternPreset};
use crate::error::{PatternError, Result};

/// Storage key holding the user preset array.
pub const DEFAULT_PRESETS_KEY: &str = "pattern-presets";

/// Total bytes the store may occupy (5 MiB).
pub const DEFAULT_STORAGE_BUDGET: usize = 5 * 1024 * 1024;

/// Preset store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key the preset array is written under.
    pub presets_key: String,
    /// Upper bound on the storage size after a write, in bytes. Counts every
    /// stored key and value, not just presets.
    pub storage_budget: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            presets_key: DEFAULT_PRESETS_KEY.to_string(),
            storage_budget: DEFAULT_STORAGE_BUDGET,
        }
    }
}

impl StoreConfig {
    pub fn with_presets_key(mut self, key: impl Into<String>) -> Self {
        self.presets_key = key.into();
        self
    }

    pub fn with_storage_budget(mut self, bytes: usize) -> Self {
        self.storage_budget = bytes;
        self
    }
}

/// The stored preset array, split into records that parsed and raw records
/// that did not.
#[derive(Debug, Default)]
struct StoredRecords {
    presets: Vec<PatternPreset>,
    unparsed: Vec<Value>,
}

/// User presets on top of a [`Storage`] port.
///
/// Reads are tolerant: missing or corrupt data loads as an empty list and
/// malformed records are skipped individually. Writes that would exceed the
/// storage budget are refused.
#[derive(Debug)]
pub struct PresetStore<S> {
    storage: S,
    config: StoreConfig,
}

impl<S: Storage> PresetStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn read_records(&self) -> Result<StoredRecords> {
        let raw = match self.storage.get(&self.config.presets_key)? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(StoredRecords::default()),
        };

        let values: Vec<Value> = serde_json::from_str(&raw)?;
        let mut records = StoredRecords::default();
        for value in values {
            match PatternPreset::deserialize(&value) {
                Ok(mut preset) => {
                    preset.ensure_hash();
                    records.presets.push(preset);
                }
                Err(e) => {
                    log::warn!("Skipping malformed preset record: {}", e);
                    records.unparsed.push(value);
                }
            }
        }
        Ok(records)
    }

    /// Records for a read-modify-write. An unreadable array counts as empty
    /// and is replaced by the write.
    fn records_for_update(&self) -> StoredRecords {
        match self.read_records() {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Stored presets unreadable, starting from an empty list: {}", e);
                StoredRecords::default()
            }
        }
    }

    fn write_records(&mut self, presets: &[PatternPreset], unparsed: &[Value]) -> Result<()> {
        if let Some((preset, key)) = presets
            .iter()
            .find_map(|p| p.non_finite_parameter().map(|key| (p, key)))
        {
            return Err(PatternError::NonFiniteParameter {
                preset: preset.name.clone(),
                key: key.to_string(),
            });
        }

        let mut values = presets
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        values.extend(unparsed.iter().cloned());
        let payload = serde_json::to_string(&values)?;

        let key = &self.config.presets_key;
        let needed = self.storage.usage_excluding(key)? + key.len() + payload.len();
        if needed > self.config.storage_budget {
            return Err(PatternError::QuotaExceeded {
                needed,
                budget: self.config.storage_budget,
            });
        }
        self.storage.set(key, payload)
    }

    /// Load every user preset, surfacing storage and JSON errors.
    ///
    /// Individual records that fail to parse are skipped with a warning.
    pub fn try_load_user_presets(&self) -> Result<Vec<PatternPreset>> {
        Ok(self.read_records()?.presets)
    }

    /// Load every user preset. Never fails; problems yield an empty list.
    pub fn load_user_presets(&self) -> Vec<PatternPreset> {
        match self.try_load_user_presets() {
            Ok(presets) => presets,
            Err(e) => {
                log::warn!("Failed to load user presets: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the stored preset list. Stored records that could not be
    /// parsed are kept.
    ///
    /// Fails with [`PatternError::NonFiniteParameter`] if a preset holds a
    /// NaN or infinite number, and with [`PatternError::QuotaExceeded`] if
    /// the other stored entries plus the new payload would exceed the budget.
    pub fn try_save_user_presets(&mut self, presets: &[PatternPreset]) -> Result<()> {
        let unparsed = self.records_for_update().unparsed;
        self.write_records(presets, &unparsed)
    }

    /// Replace the stored preset list. Returns `false` (and logs) instead of
    /// failing.
    pub fn save_user_presets(&mut self, presets: &[PatternPreset]) -> bool {
        match self.try_save_user_presets(presets) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to save user presets: {}", e);
                false
            }
        }
    }

    /// User presets for one generator type, oldest first.
    pub fn presets_for(&self, generator_type: &str) -> Vec<PatternPreset> {
        let mut presets: Vec<_> = self
            .load_user_presets()
            .into_iter()
            .filter(|p| p.generator_type == generator_type)
            .collect();
        presets.sort_by_key(|p| p.created_at);
        presets
    }

    /// Save the given values as a named preset.
    ///
    /// If a preset with the same name, generator type and content hash
    /// already exists it is returned unchanged and nothing is written. Any
    /// other save appends a new record; existing records are never edited.
    pub fn save_preset(&mut self, name: &str, generator_type: &str, parameters: ParamMap) -> Result<PatternPreset> {
        let StoredRecords { mut presets, unparsed } = self.records_for_update();
        let hash = content_hash(name, generator_type, &parameters);

        if let Some(existing) = presets
            .iter()
            .find(|p| p.generator_type == generator_type && p.name == name && p.content_hash == hash)
        {
            log::debug!("Preset {:?} unchanged, skipping write", name);
            return Ok(existing.clone());
        }

        let preset = PatternPreset::new(name, generator_type, parameters);
        presets.push(preset.clone());
        self.write_records(&presets, &unparsed)?;
        Ok(preset)
    }

    /// Delete a preset by id. Returns whether anything was removed.
    pub fn delete_preset(&mut self, id: &str) -> Result<bool> {
        let StoredRecords { mut presets, unparsed } = self.read_records()?;
        let before = presets.len();
        presets.retain(|p| p.id != id);
        if presets.len() == before {
            return Ok(false);
        }
        self.write_records(&presets, &unparsed)?;
        Ok(true)
    }

    /// Mark a preset as the user default for its generator type, clearing
    /// the mark on every other preset of that type.
    pub fn set_user_default(&mut self, id: &str) -> Result<PatternPreset> {
        let StoredRecords { mut presets, unparsed } = self.read_records()?;
        let generator_type = presets
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.generator_type.clone())
            .ok_or_else(|| PatternError::UnknownPreset(id.to_string()))?;

        for preset in presets.iter_mut().filter(|p| p.generator_type == generator_type) {
            preset.is_user_default = preset.id == id;
        }
        self.write_records(&presets, &unparsed)?;

        presets
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PatternError::UnknownPreset(id.to_string()))
    }

    /// Remove the user default mark for a generator type.
    pub fn clear_user_default(&mut self, generator_type: &str) -> Result<()> {
        let StoredRecords { mut presets, unparsed } = self.read_records()?;
        let mut changed = false;
        for preset in presets
            .iter_mut()
            .filter(|p| p.generator_type == generator_type && p.is_user_default)
        {
            preset.is_user_default = false;
            changed = true;
        }
        if changed {
            self.write_records(&presets, &unparsed)?;
        }
        Ok(())
    }

    /// The user default for a generator type, if one is marked.
    pub fn user_default(&self, generator_type: &str) -> Result<Option<PatternPreset>> {
        Ok(self
            .try_load_user_presets()?
            .into_iter()
            .find(|p| p.generator_type == generator_type && p.is_user_default))
    }

    /// Drop stored records flagged as factory presets.
    ///
    /// Older stores copied factory presets into user storage; those copies go
    /// stale whenever the bundle changes. Returns how many were removed.
    pub fn purge_factory_copies(&mut self) -> Result<usize> {
        let StoredRecords { mut presets, unparsed } = self.read_records()?;
        let before = presets.len();
        presets.retain(|p| !p.is_factory);
        let removed = before - presets.len();
        if removed > 0 {
            self.write_records(&presets, &unparsed)?;
            log::debug!("Purged {} stale factory preset copies", removed);
        }
        Ok(removed)
    }

    /// How many stored records could not be parsed.
    pub fn unparsed_record_count(&self) -> Result<usize> {
        Ok(self.read_records()?.unparsed.len())
    }

    /// Remove stored records that could not be parsed. Returns how many were
    /// removed.
    pub fn discard_unparsed_records(&mut self) -> Result<usize> {
        let StoredRecords { presets, unparsed } = self.read_records()?;
        if !unparsed.is_empty() {
            self.write_records(&presets, &[])?;
            log::debug!("Discarded {} unparsed preset records", unparsed.len());
        }
        Ok(unparsed.len())
    }
}
