//! Pattern definitions and their controls.
//!
//! A pattern exposes a list of [`Control`]s. Each control has a kind with a
//! built-in default, which together form the final fallback tier of preset
//! resolution. Control kinds are a closed enum; code that needs per-kind
//! behaviour matches on [`ControlKind`] exhaustively.
//!
//! ```
//! use patternkit::pattern::{Control, PatternDefinition};
//! use patternkit::preset::ParamValue;
//!
//! let tone = PatternDefinition::new("oscillator", "Oscillator")
//!     .with_control(Control::range("frequency", "Frequency", 20.0, 2000.0, 1.0, 440.0))
//!     .with_control(Control::select("waveform", "Waveform", &["sine", "square"], "sine"));
//!
//! let defaults = tone.default_values();
//! assert_eq!(defaults["frequency"], ParamValue::Number(440.0));
//! ```

use serde::{Deserialize, Serialize};

use crate::attractor::{AizawaParams, HalvorsenParams, LorenzParams, ThomasParams, DEFAULT_DT};
use crate::preset::{ParamMap, ParamValue, PatternPreset};

/// What a control edits and how its values are constrained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlKind {
    /// Numeric slider over `[min, max]`.
    Range { min: f64, max: f64, step: f64, default: f64 },
    /// On/off switch.
    Toggle { default: bool },
    /// One of a fixed list of strings.
    Select { options: Vec<String>, default: String },
    /// `#rrggbb` colour.
    Color { default: String },
}

impl ControlKind {
    pub fn default_value(&self) -> ParamValue {
        match self {
            ControlKind::Range { default, .. } => ParamValue::Number(*default),
            ControlKind::Toggle { default } => ParamValue::Bool(*default),
            ControlKind::Select { default, .. } => ParamValue::Text(default.clone()),
            ControlKind::Color { default } => ParamValue::Text(default.clone()),
        }
    }

    /// Whether `value` is a legal setting for this control.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ControlKind::Range { min, max, .. }, ParamValue::Number(n)) => n.is_finite() && *n >= *min && *n <= *max,
            (ControlKind::Toggle { .. }, ParamValue::Bool(_)) => true,
            (ControlKind::Select { options, .. }, ParamValue::Text(s)) => options.iter().any(|o| o == s),
            (ControlKind::Color { .. }, ParamValue::Text(s)) => is_hex_color(s),
            _ => false,
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// One user-adjustable value of a pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: ControlKind,
}

impl Control {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
        }
    }

    pub fn range(id: &str, label: &str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self::new(id, label, ControlKind::Range { min, max, step, default })
    }

    pub fn toggle(id: &str, label: &str, default: bool) -> Self {
        Self::new(id, label, ControlKind::Toggle { default })
    }

    pub fn select(id: &str, label: &str, options: &[&str], default: &str) -> Self {
        Self::new(
            id,
            label,
            ControlKind::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
                default: default.to_string(),
            },
        )
    }

    pub fn color(id: &str, label: &str, default: &str) -> Self {
        Self::new(id, label, ControlKind::Color { default: default.to_string() })
    }

    pub fn default_value(&self) -> ParamValue {
        self.kind.default_value()
    }
}

/// A pattern's identity and controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub controls: Vec<Control>,
}

impl PatternDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    /// Built-in value of every control.
    pub fn default_values(&self) -> ParamMap {
        self.controls
            .iter()
            .map(|c| (c.id.clone(), c.default_value()))
            .collect()
    }

    /// Control values after applying `preset` over the defaults.
    ///
    /// Only controls this pattern defines are touched. Preset values a
    /// control would reject (wrong kind, out of range, unknown option) are
    /// skipped and the default kept.
    pub fn apply(&self, preset: &PatternPreset) -> ParamMap {
        let mut values = self.default_values();
        for control in &self.controls {
            let Some(value) = preset.parameters.get(&control.id) else {
                continue;
            };
            if control.kind.accepts(value) {
                values.insert(control.id.clone(), value.clone());
            } else {
                log::debug!(
                    "Preset {:?} value {} rejected by control {:?}",
                    preset.name,
                    value,
                    control.id
                );
            }
        }
        values
    }
}

fn timestep(default: f64) -> Control {
    Control::range("dt", "Timestep", 0.001, 0.1, 0.001, default)
}

/// Every pattern the kernel knows about.
pub fn builtin_patterns() -> Vec<PatternDefinition> {
    let lorenz = LorenzParams::default();
    let aizawa = AizawaParams::default();
    let halvorsen = HalvorsenParams::default();
    let thomas = ThomasParams::default();

    vec![
        PatternDefinition::new("lorenz", "Lorenz Attractor")
            .with_control(Control::range("sigma", "Sigma", 0.0, 50.0, 0.1, lorenz.sigma))
            .with_control(Control::range("rho", "Rho", 0.0, 100.0, 0.1, lorenz.rho))
            .with_control(Control::range("beta", "Beta", 0.0, 10.0, 0.01, lorenz.beta))
            .with_control(timestep(DEFAULT_DT))
            .with_control(Control::color("color", "Color", "#ff8c42")),
        PatternDefinition::new("aizawa", "Aizawa Attractor")
            .with_control(Control::range("a", "A", 0.0, 2.0, 0.01, aizawa.a))
            .with_control(Control::range("b", "B", 0.0, 2.0, 0.01, aizawa.b))
            .with_control(Control::range("c", "C", 0.0, 2.0, 0.01, aizawa.c))
            .with_control(Control::range("d", "D", 0.0, 10.0, 0.01, aizawa.d))
            .with_control(Control::range("e", "E", 0.0, 1.0, 0.01, aizawa.e))
            .with_control(Control::range("f", "F", 0.0, 1.0, 0.01, aizawa.f))
            .with_control(timestep(DEFAULT_DT))
            .with_control(Control::color("color", "Color", "#b5179e")),
        PatternDefinition::new("halvorsen", "Halvorsen Attractor")
            .with_control(Control::range("a", "A", 0.5, 3.0, 0.01, halvorsen.a))
            .with_control(timestep(0.005))
            .with_control(Control::color("color", "Color", "#80ed99")),
        PatternDefinition::new("thomas", "Thomas Attractor")
            .with_control(Control::range("b", "B", 0.0, 1.0, 0.001, thomas.b))
            .with_control(timestep(0.05))
            .with_control(Control::color("color", "Color", "#ffd166")),
        PatternDefinition::new("simplex-noise", "Simplex Noise Field")
            .with_control(Control::range("scale", "Scale", 0.1, 10.0, 0.1, 1.0))
            .with_control(Control::range("speed", "Speed", 0.0, 5.0, 0.05, 0.5))
            .with_control(Control::range("octaves", "Octaves", 1.0, 8.0, 1.0, 4.0))
            .with_control(Control::select("palette", "Palette", &["ocean", "ember", "mono"], "ocean"))
            .with_control(Control::toggle("animate", "Animate", true)),
    ]
}

/// Look up a built-in pattern by id.
pub fn builtin_pattern(id: &str) -> Option<PatternDefinition> {
    builtin_patterns().into_iter().find(|p| p.id == id)
}
