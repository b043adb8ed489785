//! Saved pattern configurations and their precedence.
//!
//! A [`PatternPreset`] is a named set of control values for one generator
//! type. Presets come from two places:
//!
//! - **User presets**, persisted as a JSON array through a [`Storage`] port
//!   and managed by [`PresetStore`].
//! - **Factory presets**, read-only records shipped with the crate (or any
//!   other [`FactorySource`]) and cached by [`FactoryPresets`].
//!
//! [`PresetResolver`] decides which preset populates a pattern on load:
//! the user's default, else the factory default, else the pattern's own
//! built-in defaults. Every failure on the way is logged and skipped.
//!
//! ```
//! use patternkit::preset::{is_modified, ParamMap, ParamValue, PatternPreset};
//!
//! let mut params = ParamMap::new();
//! params.insert("frequency".into(), ParamValue::Number(440.0));
//! let preset = PatternPreset::new("A4", "oscillator", params.clone());
//!
//! assert!(!is_modified(&params, &preset));
//! params.insert("frequency".into(), ParamValue::Number(441.0));
//! assert!(is_modified(&params, &preset));
//! ```

mod factory;
mod resolver;
mod storage;
mod store;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use factory::{
    parse_factory_bundle, BundledFactoryPresets, FactoryPresets, FactorySource, FileFactoryPresets,
};
pub use resolver::{EffectiveDefault, PresetResolver};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{PresetStore, StoreConfig, DEFAULT_PRESETS_KEY, DEFAULT_STORAGE_BUDGET};

/// Tolerance for numeric comparisons in [`is_modified`].
///
/// Absorbs float noise from a round trip through JSON storage.
pub const MODIFIED_EPSILON: f64 = 1e-10;

/// Control values keyed by control id. Sorted, so hashing and
/// serialization are independent of insertion order.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// A primitive control value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `false` only for NaN or infinite numbers, which JSON cannot carry.
    pub fn is_finite(&self) -> bool {
        match self {
            ParamValue::Number(n) => n.is_finite(),
            _ => true,
        }
    }

    /// Equality as used for modification detection.
    ///
    /// Numbers match within [`MODIFIED_EPSILON`]; strings and booleans must
    /// be identical; values of different kinds never match.
    pub fn approx_eq(&self, other: &ParamValue) -> bool {
        match (self, other) {
            (ParamValue::Number(a), ParamValue::Number(b)) => a == b || (a - b).abs() <= MODIFIED_EPSILON,
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// A saved configuration for one generator type.
///
/// Field names serialize in camelCase (`generatorType`, `createdAt`,
/// `contentHash`, ...) and `createdAt` as an RFC 3339 string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternPreset {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Pattern id this preset applies to. May be omitted inside a
    /// partitioned factory bundle, where the partition key fills it in.
    #[serde(default)]
    pub generator_type: String,
    #[serde(default)]
    pub parameters: ParamMap,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub is_factory: bool,
    /// Factory-designated default for its generator type.
    #[serde(default)]
    pub is_default: bool,
    /// User-designated default for its generator type.
    #[serde(default)]
    pub is_user_default: bool,
}

impl PatternPreset {
    /// Create a fresh user preset stamped with the current time.
    pub fn new(name: impl Into<String>, generator_type: impl Into<String>, parameters: ParamMap) -> Self {
        let name = name.into();
        let generator_type = generator_type.into();
        let created_at = Utc::now();
        let content_hash = content_hash(&name, &generator_type, &parameters);
        let id = format!(
            "{}-{:x}-{:08x}",
            generator_type,
            created_at.timestamp_millis(),
            rand::random::<u32>()
        );

        Self {
            id,
            name,
            generator_type,
            parameters,
            created_at,
            content_hash,
            is_factory: false,
            is_default: false,
            is_user_default: false,
        }
    }

    /// Hash of this preset's defining fields.
    pub fn compute_hash(&self) -> String {
        content_hash(&self.name, &self.generator_type, &self.parameters)
    }

    /// First parameter whose value cannot be stored, if any.
    pub fn non_finite_parameter(&self) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(key, _)| key.as_str())
    }

    /// Fill in a missing content hash. Records written by hand (factory
    /// bundles, older stores) may not carry one.
    pub(crate) fn ensure_hash(&mut self) {
        if self.content_hash.is_empty() {
            self.content_hash = self.compute_hash();
        }
    }
}

/// Deterministic fingerprint of a preset's name, generator type and
/// parameters: the first 8 bytes of a SHA-256 digest, hex encoded.
///
/// Parameters are fed in key order, so the hash does not depend on the
/// order values were set in.
pub fn content_hash(name: &str, generator_type: &str, parameters: &ParamMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(generator_type.as_bytes());
    hasher.update([0u8]);

    for (key, value) in parameters {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        match value {
            ParamValue::Bool(b) => hasher.update([b'b', *b as u8]),
            ParamValue::Number(n) => {
                hasher.update([b'n']);
                hasher.update(n.to_bits().to_le_bytes());
            }
            ParamValue::Text(s) => {
                hasher.update([b's']);
                hasher.update(s.as_bytes());
            }
        }
        hasher.update([0u8]);
    }

    hasher.finalize()[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Whether `current` control values have drifted from `preset`.
///
/// Only keys present on both sides are compared. Controls the preset does
/// not mention, and preset keys with no live control, are ignored.
pub fn is_modified(current: &ParamMap, preset: &PatternPreset) -> bool {
    current.iter().any(|(key, value)| match preset.parameters.get(key) {
        Some(reference) => !value.approx_eq(reference),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_param_value_untagged_json() {
        let map: ParamMap = serde_json::from_str(r#"{"a": 1.5, "b": true, "c": "sine", "d": 3}"#).unwrap();
        assert_eq!(map["a"], ParamValue::Number(1.5));
        assert_eq!(map["b"], ParamValue::Bool(true));
        assert_eq!(map["c"], ParamValue::Text("sine".into()));
        assert_eq!(map["d"], ParamValue::Number(3.0));
    }

    #[test]
    fn test_content_hash_deterministic_and_order_independent() {
        let mut a = ParamMap::new();
        a.insert("x".into(), 1.0.into());
        a.insert("y".into(), "z".into());
        let mut b = ParamMap::new();
        b.insert("y".into(), "z".into());
        b.insert("x".into(), 1.0.into());

        let ha = content_hash("n", "t", &a);
        assert_eq!(ha, content_hash("n", "t", &b));
        assert_eq!(ha.len(), 16);
        assert_ne!(ha, content_hash("n2", "t", &a));
        assert_ne!(ha, content_hash("n", "t2", &a));
    }

    #[test]
    fn test_content_hash_distinguishes_value_kinds() {
        let num = params(&[("v", ParamValue::Number(1.0))]);
        let text = params(&[("v", ParamValue::Text("1".into()))]);
        let flag = params(&[("v", ParamValue::Bool(true))]);
        let hashes = [
            content_hash("p", "t", &num),
            content_hash("p", "t", &text),
            content_hash("p", "t", &flag),
        ];
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[1], hashes[2]);
        assert_ne!(hashes[0], hashes[2]);
    }

    #[test]
    fn test_new_preset_fields() {
        let p = PatternPreset::new("Calm", "lorenz", params(&[("rho", 20.0.into())]));
        assert!(p.id.starts_with("lorenz-"));
        assert_eq!(p.content_hash, p.compute_hash());
        assert!(!p.is_factory && !p.is_default && !p.is_user_default);
    }

    #[test]
    fn test_preset_json_shape() {
        let p = PatternPreset::new("Calm", "lorenz", params(&[("rho", 20.0.into())]));
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("generatorType").is_some());
        assert!(json.get("isUserDefault").is_some());
        assert!(json["createdAt"].is_string());

        let back: PatternPreset = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_not_modified_within_epsilon() {
        let reference = params(&[
            ("frequency", 440.0.into()),
            ("amplitude", 0.5.into()),
            ("waveform", "sine".into()),
            ("enabled", true.into()),
        ]);
        let preset = PatternPreset::new("Tone", "oscillator", reference.clone());

        let mut current = reference;
        current.insert("amplitude".into(), (0.5 + 1e-12).into());
        assert!(!is_modified(&current, &preset));
    }

    #[test]
    fn test_single_difference_is_modified() {
        let reference = params(&[("frequency", 440.0.into()), ("waveform", "sine".into()), ("on", true.into())]);
        let preset = PatternPreset::new("Tone", "oscillator", reference.clone());

        for (key, value) in [
            ("frequency", ParamValue::Number(440.001)),
            ("waveform", ParamValue::Text("square".into())),
            ("on", ParamValue::Bool(false)),
            ("frequency", ParamValue::Text("440".into())),
        ] {
            let mut current = reference.clone();
            current.insert(key.into(), value);
            assert!(is_modified(&current, &preset), "{key} should register");
        }
    }

    #[test]
    fn test_missing_keys_are_ignored() {
        let preset = PatternPreset::new(
            "Tone",
            "oscillator",
            params(&[("frequency", 440.0.into()), ("retired", 1.0.into())]),
        );
        let current = params(&[("frequency", 440.0.into()), ("brand_new", 7.0.into())]);
        assert!(!is_modified(&current, &preset));
    }
}
