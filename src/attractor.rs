//! Chaotic attractor integrators.
//!
//! Each system is a pure function advancing a point in phase space by one
//! forward-Euler step:
//!
//! ```text
//! p' = p + f(p) * dt
//! ```
//!
//! Nothing is clamped. Large `dt` or extreme coefficients can blow a
//! trajectory up to infinity or NaN; that is not an error here; it is the
//! renderer's job to drop non-finite points (see [`pack_vertices`]).
//!
//! # Systems
//!
//! | System | Derivative |
//! |--------|------------|
//! | [`lorenz`] | `σ(y−x)`, `x(ρ−z)−y`, `xy−βz` |
//! | [`aizawa`] | `(z−b)x−dy`, `dx+(z−b)y`, `c+az−z³/3−(x²+y²)(1+ez)+fzx³` |
//! | [`halvorsen`] | `−ax−4y−4z−y²`, `−ay−4z−4x−z²`, `−az−4x−4y−x²` |
//! | [`thomas`] | `sin y−bx`, `sin z−by`, `sin x−bz` |
//!
//! # Example
//!
//! ```
//! use patternkit::attractor::{lorenz, LorenzParams, Point3};
//!
//! let p = lorenz(Point3::ONE, &LorenzParams::default(), 0.01);
//! assert!((p.y - 1.26).abs() < 1e-12);
//! ```

use std::collections::BTreeMap;

use glam::{DVec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::preset::ParamValue;

/// A point in phase space.
pub type Point3 = DVec3;

/// Default timestep used by the pattern definitions.
pub const DEFAULT_DT: f64 = 0.01;

// ============================================================================
// Parameters
// ============================================================================

/// Lorenz system coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorenzParams {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Default for LorenzParams {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
        }
    }
}

/// Aizawa system coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AizawaParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for AizawaParams {
    fn default() -> Self {
        Self {
            a: 0.95,
            b: 0.7,
            c: 0.6,
            d: 3.5,
            e: 0.25,
            f: 0.1,
        }
    }
}

/// Halvorsen system coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalvorsenParams {
    pub a: f64,
}

impl Default for HalvorsenParams {
    fn default() -> Self {
        Self { a: 1.89 }
    }
}

/// Thomas (cyclically symmetric) system damping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThomasParams {
    pub b: f64,
}

impl Default for ThomasParams {
    fn default() -> Self {
        Self { b: 0.208186 }
    }
}

// ============================================================================
// Integrators
// ============================================================================

/// One Euler step of the Lorenz system.
#[inline]
pub fn lorenz(p: Point3, params: &LorenzParams, dt: f64) -> Point3 {
    euler(p, lorenz_derivative(p, params), dt)
}

/// One Euler step of the Aizawa system.
#[inline]
pub fn aizawa(p: Point3, params: &AizawaParams, dt: f64) -> Point3 {
    euler(p, aizawa_derivative(p, params), dt)
}

/// One Euler step of the Halvorsen system.
#[inline]
pub fn halvorsen(p: Point3, params: &HalvorsenParams, dt: f64) -> Point3 {
    euler(p, halvorsen_derivative(p, params), dt)
}

/// One Euler step of the Thomas system.
#[inline]
pub fn thomas(p: Point3, params: &ThomasParams, dt: f64) -> Point3 {
    euler(p, thomas_derivative(p, params), dt)
}

#[inline]
fn euler(p: Point3, d: Point3, dt: f64) -> Point3 {
    Point3::new(p.x + d.x * dt, p.y + d.y * dt, p.z + d.z * dt)
}

fn lorenz_derivative(p: Point3, k: &LorenzParams) -> Point3 {
    let Point3 { x, y, z } = p;
    Point3::new(k.sigma * (y - x), x * (k.rho - z) - y, x * y - k.beta * z)
}

fn aizawa_derivative(p: Point3, k: &AizawaParams) -> Point3 {
    let Point3 { x, y, z } = p;
    Point3::new(
        (z - k.b) * x - k.d * y,
        k.d * x + (z - k.b) * y,
        k.c + k.a * z - (z * z * z) / 3.0 - (x * x + y * y) * (1.0 + k.e * z)
            + k.f * z * (x * x * x),
    )
}

fn halvorsen_derivative(p: Point3, k: &HalvorsenParams) -> Point3 {
    let Point3 { x, y, z } = p;
    Point3::new(
        -k.a * x - 4.0 * y - 4.0 * z - y * y,
        -k.a * y - 4.0 * z - 4.0 * x - z * z,
        -k.a * z - 4.0 * x - 4.0 * y - x * x,
    )
}

fn thomas_derivative(p: Point3, k: &ThomasParams) -> Point3 {
    let Point3 { x, y, z } = p;
    Point3::new(y.sin() - k.b * x, z.sin() - k.b * y, x.sin() - k.b * z)
}

// ============================================================================
// Attractor enum
// ============================================================================

/// Any of the supported systems together with its coefficients.
///
/// Serializes with a `type` tag matching the pattern id, e.g.
/// `{"type": "lorenz", "sigma": 10.0, "rho": 28.0, "beta": 2.667}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attractor {
    Lorenz(LorenzParams),
    Aizawa(AizawaParams),
    Halvorsen(HalvorsenParams),
    Thomas(ThomasParams),
}

impl Attractor {
    /// Pattern ids of every supported system.
    pub const NAMES: [&'static str; 4] = ["lorenz", "aizawa", "halvorsen", "thomas"];

    /// Pattern id of this system.
    pub fn name(&self) -> &'static str {
        match self {
            Attractor::Lorenz(_) => "lorenz",
            Attractor::Aizawa(_) => "aizawa",
            Attractor::Halvorsen(_) => "halvorsen",
            Attractor::Thomas(_) => "thomas",
        }
    }

    /// System with default coefficients for a pattern id.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lorenz" => Some(Attractor::Lorenz(LorenzParams::default())),
            "aizawa" => Some(Attractor::Aizawa(AizawaParams::default())),
            "halvorsen" => Some(Attractor::Halvorsen(HalvorsenParams::default())),
            "thomas" => Some(Attractor::Thomas(ThomasParams::default())),
            _ => None,
        }
    }

    /// Build a system from preset parameters.
    ///
    /// Coefficients missing from `params` (or not numeric) keep their
    /// defaults; extra keys such as `dt` or colour controls are ignored.
    /// Returns `None` if `generator_type` is not an attractor.
    pub fn from_parameters(generator_type: &str, params: &BTreeMap<String, ParamValue>) -> Option<Self> {
        let num = |key: &str, fallback: f64| params.get(key).and_then(ParamValue::as_f64).unwrap_or(fallback);

        let attractor = match Self::from_name(generator_type)? {
            Attractor::Lorenz(k) => Attractor::Lorenz(LorenzParams {
                sigma: num("sigma", k.sigma),
                rho: num("rho", k.rho),
                beta: num("beta", k.beta),
            }),
            Attractor::Aizawa(k) => Attractor::Aizawa(AizawaParams {
                a: num("a", k.a),
                b: num("b", k.b),
                c: num("c", k.c),
                d: num("d", k.d),
                e: num("e", k.e),
                f: num("f", k.f),
            }),
            Attractor::Halvorsen(k) => Attractor::Halvorsen(HalvorsenParams { a: num("a", k.a) }),
            Attractor::Thomas(k) => Attractor::Thomas(ThomasParams { b: num("b", k.b) }),
        };
        Some(attractor)
    }

    /// Coefficients as `(name, value)` pairs, in declaration order.
    pub fn coefficients(&self) -> Vec<(&'static str, f64)> {
        match self {
            Attractor::Lorenz(k) => vec![("sigma", k.sigma), ("rho", k.rho), ("beta", k.beta)],
            Attractor::Aizawa(k) => vec![
                ("a", k.a),
                ("b", k.b),
                ("c", k.c),
                ("d", k.d),
                ("e", k.e),
                ("f", k.f),
            ],
            Attractor::Halvorsen(k) => vec![("a", k.a)],
            Attractor::Thomas(k) => vec![("b", k.b)],
        }
    }

    /// Derivative vector at `p`.
    pub fn derivative(&self, p: Point3) -> Point3 {
        match self {
            Attractor::Lorenz(k) => lorenz_derivative(p, k),
            Attractor::Aizawa(k) => aizawa_derivative(p, k),
            Attractor::Halvorsen(k) => halvorsen_derivative(p, k),
            Attractor::Thomas(k) => thomas_derivative(p, k),
        }
    }

    /// One Euler step from `p`.
    pub fn step(&self, p: Point3, dt: f64) -> Point3 {
        euler(p, self.derivative(p), dt)
    }

    /// Endless iterator of successive points after `start`.
    ///
    /// ```
    /// use patternkit::attractor::{Attractor, Point3};
    ///
    /// let thomas = Attractor::from_name("thomas").unwrap();
    /// let points: Vec<Point3> = thomas.trajectory(Point3::new(0.1, 0.0, 0.0), 0.05).take(100).collect();
    /// assert_eq!(points.len(), 100);
    /// ```
    pub fn trajectory(&self, start: Point3, dt: f64) -> Trajectory {
        Trajectory {
            attractor: *self,
            point: start,
            dt,
        }
    }
}

/// Iterator produced by [`Attractor::trajectory`].
#[derive(Clone, Debug)]
pub struct Trajectory {
    attractor: Attractor,
    point: Point3,
    dt: f64,
}

impl Trajectory {
    /// The most recently produced point (or the start point).
    pub fn current(&self) -> Point3 {
        self.point
    }
}

impl Iterator for Trajectory {
    type Item = Point3;

    fn next(&mut self) -> Option<Point3> {
        self.point = self.attractor.step(self.point, self.dt);
        Some(self.point)
    }
}

// ============================================================================
// Vertex packing
// ============================================================================

/// Convert trajectory points into `vec4<f32>` vertex data (`w = 1`).
///
/// Points with any non-finite component are dropped, including points
/// that only overflow once narrowed to `f32`, so a diverged trajectory
/// simply stops contributing vertices.
pub fn pack_vertices(points: impl IntoIterator<Item = Point3>) -> Vec<Vec4> {
    points
        .into_iter()
        .map(|p| p.as_vec3().extend(1.0))
        .filter(|v| v.is_finite())
        .collect()
}

/// Raw bytes of packed vertices, ready for a vertex buffer upload.
pub fn vertex_bytes(vertices: &[Vec4]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}
