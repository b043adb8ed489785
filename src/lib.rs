//! # patternkit - numerical kernel for pattern generators
//!
//! The maths and state behind a gallery of generative patterns, without any
//! of the drawing. A renderer (Canvas2D, WebGL, wgpu, a terminal) calls into
//! this crate for point positions, noise samples and the control values a
//! pattern should start with.
//!
//! ## Quick Start
//!
//! ```
//! use patternkit::prelude::*;
//!
//! // Integrate a Lorenz trajectory
//! let lorenz = Attractor::from_name("lorenz").unwrap();
//! let points: Vec<Point3> = lorenz.trajectory(Point3::new(1.0, 1.0, 1.0), 0.01).take(1_000).collect();
//! let vertices = pack_vertices(points);
//! assert_eq!(vertices.len(), 1_000);
//!
//! // Sample noise
//! let noise = SimplexNoise::new();
//! let v = noise.noise3(0.5, 0.25, 2.0);
//! assert!((-1.0..=1.0).contains(&v));
//!
//! // Work out what the pattern should start with
//! let store = PresetStore::new(MemoryStorage::new());
//! let factory = FactoryPresets::new(BundledFactoryPresets::new());
//! let resolver = PresetResolver::new(&store, &factory);
//! let pattern = builtin_pattern("lorenz").unwrap();
//! let values = pollster::block_on(resolver.effective_values(&pattern));
//! assert!(values.contains_key("rho"));
//! ```
//!
//! ## Core Concepts
//!
//! ### Attractors
//!
//! Four chaotic systems (Lorenz, Aizawa, Halvorsen, Thomas), each a pure
//! forward-Euler step. See [`attractor`]. Divergence is not an error; use
//! [`pack_vertices`] to drop non-finite points before upload.
//!
//! ### Noise
//!
//! [`SimplexNoise`] is deterministic: every generator built with
//! [`SimplexNoise::new`] returns the same field. [`NoiseCache`] shares
//! generators by name.
//!
//! ### Presets
//!
//! | Tier | Source |
//! |------|--------|
//! | 1 | User default, from [`PresetStore`] over a [`Storage`] port |
//! | 2 | Factory default, from [`FactoryPresets`] |
//! | 3 | The pattern's control defaults, from [`PatternDefinition`] |
//!
//! [`PresetResolver`] walks the tiers in order and never fails;
//! [`is_modified`] tells a UI whether live values still match a preset.

pub mod attractor;
mod error;
pub mod noise;
pub mod pattern;
pub mod preset;

pub use attractor::{pack_vertices, vertex_bytes, Attractor, Point3, Trajectory};
pub use error::{PatternError, Result};
pub use glam::{DVec3, Vec4};
pub use noise::{NoiseCache, SimplexNoise};
pub use pattern::{builtin_pattern, builtin_patterns, Control, ControlKind, PatternDefinition};
pub use preset::{
    is_modified, BundledFactoryPresets, EffectiveDefault, FactoryPresets, FactorySource, FileFactoryPresets,
    FileStorage, MemoryStorage, ParamMap, ParamValue, PatternPreset, PresetResolver, PresetStore, Storage,
    StoreConfig,
};

/// Convenient re-exports for common usage.
///
/// ```
/// use patternkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attractor::{
        aizawa, halvorsen, lorenz, pack_vertices, thomas, AizawaParams, Attractor, HalvorsenParams,
        LorenzParams, Point3, ThomasParams,
    };
    pub use crate::error::{PatternError, Result};
    pub use crate::noise::{NoiseCache, SimplexNoise};
    pub use crate::pattern::{builtin_pattern, builtin_patterns, Control, ControlKind, PatternDefinition};
    pub use crate::preset::{
        is_modified, BundledFactoryPresets, EffectiveDefault, FactoryPresets, FactorySource, FileFactoryPresets,
        FileStorage, MemoryStorage, ParamMap, ParamValue, PatternPreset, PresetResolver, PresetStore, Storage,
        StoreConfig,
    };
}
