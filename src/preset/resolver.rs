//! Effective-default resolution.
//!
//! Precedence, checked strictly in order:
//!
//! 1. the user's default preset for the pattern,
//! 2. the factory default preset for the pattern,
//! 3. the pattern's built-in control defaults.
//!
//! A failure at any tier is logged and treated as "not found". Resolution
//! itself never fails.
//!
//! The factory fetch has no timeout. Bundled and on-disk sources complete
//! immediately; callers awaiting a slower source can race the future against
//! their own runtime's timer or simply drop it.

use super::factory::{FactoryPresets, FactorySource};
use super::storage::Storage;
use super::store::PresetStore;
use super::{ParamMap, PatternPreset};
use crate::pattern::PatternDefinition;

/// Outcome of resolving a pattern's default.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectiveDefault {
    /// The user marked this preset as their default.
    User(PatternPreset),
    /// The factory bundle's default for the pattern.
    Factory(PatternPreset),
    /// No preset applies; use the pattern's own defaults.
    PatternDefaults,
}

impl EffectiveDefault {
    pub fn preset(&self) -> Option<&PatternPreset> {
        match self {
            EffectiveDefault::User(p) | EffectiveDefault::Factory(p) => Some(p),
            EffectiveDefault::PatternDefaults => None,
        }
    }

    pub fn into_preset(self) -> Option<PatternPreset> {
        match self {
            EffectiveDefault::User(p) | EffectiveDefault::Factory(p) => Some(p),
            EffectiveDefault::PatternDefaults => None,
        }
    }

    /// Short label for the tier that won.
    pub fn source(&self) -> &'static str {
        match self {
            EffectiveDefault::User(_) => "user",
            EffectiveDefault::Factory(_) => "factory",
            EffectiveDefault::PatternDefaults => "pattern",
        }
    }

    /// Control values this default produces for `pattern`.
    pub fn values(&self, pattern: &PatternDefinition) -> ParamMap {
        match self.preset() {
            Some(preset) => pattern.apply(preset),
            None => pattern.default_values(),
        }
    }
}

/// Resolves effective defaults against a user store and a factory bundle.
pub struct PresetResolver<'a, S, F> {
    store: &'a PresetStore<S>,
    factory: &'a FactoryPresets<F>,
}

impl<'a, S: Storage, F: FactorySource> PresetResolver<'a, S, F> {
    pub fn new(store: &'a PresetStore<S>, factory: &'a FactoryPresets<F>) -> Self {
        Self { store, factory }
    }

    /// Resolve which tier supplies `pattern_id`'s defaults.
    pub async fn resolve(&self, pattern_id: &str) -> EffectiveDefault {
        match self.store.user_default(pattern_id) {
            Ok(Some(preset)) => return EffectiveDefault::User(preset),
            Ok(None) => {}
            Err(e) => log::warn!("User default lookup for {:?} failed: {}", pattern_id, e),
        }

        match self.factory.default_for(pattern_id).await {
            Ok(Some(preset)) => EffectiveDefault::Factory(preset),
            Ok(None) => EffectiveDefault::PatternDefaults,
            Err(e) => {
                log::warn!("Factory default lookup for {:?} failed: {}", pattern_id, e);
                EffectiveDefault::PatternDefaults
            }
        }
    }

    /// The preset that should populate `pattern_id`, or `None` to use the
    /// pattern's own defaults.
    pub async fn effective_default(&self, pattern_id: &str) -> Option<PatternPreset> {
        self.resolve(pattern_id).await.into_preset()
    }

    /// [`effective_default`](Self::effective_default) driven to completion on
    /// the current thread.
    pub fn effective_default_blocking(&self, pattern_id: &str) -> Option<PatternPreset> {
        pollster::block_on(self.effective_default(pattern_id))
    }

    /// Control values for `pattern` after resolution.
    pub async fn effective_values(&self, pattern: &PatternDefinition) -> ParamMap {
        self.resolve(&pattern.id).await.values(pattern)
    }
}
