//! Command-line runner for patternkit.
//!
//! Resolves a pattern's effective defaults the same way the gallery does
//! (user default, then factory default, then built-in defaults) and prints
//! the resulting data as CSV.
//!
//! ```text
//! pattern-runner trajectory lorenz --steps 5000 > lorenz.csv
//! pattern-runner --store presets.json save thomas "Wide" --set b=0.18 --default
//! pattern-runner --store presets.json presets thomas
//! pattern-runner noise --samples 256
//! ```
//!
//! Set `RUST_LOG=patternkit=debug` to see preset resolution details.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::result::Result;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use patternkit::attractor::DEFAULT_DT;
use patternkit::noise::MAX_OCTAVES;
use patternkit::prelude::*;

#[derive(Parser)]
#[command(name = "pattern-runner", version, about = "Run patternkit attractors, noise and presets")]
struct Cli {
    /// JSON file used as preset storage. Presets are kept in memory if omitted.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Factory preset bundle. The bundled presets are used if omitted.
    #[arg(long, global = true)]
    factory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Integrate an attractor and print `x,y,z` rows.
    Trajectory {
        /// Pattern id: lorenz, aizawa, halvorsen or thomas.
        pattern: String,
        #[arg(long, default_value_t = 10_000)]
        steps: usize,
        /// Timestep. Defaults to the pattern's `dt` control.
        #[arg(long)]
        dt: Option<f64>,
        /// Starting point as `x,y,z`.
        #[arg(long, default_value = "0.1,0,0", value_parser = parse_point)]
        start: Point3,
    },
    /// Sample the simplex noise pattern along a line and print `x,value` rows.
    Noise {
        #[arg(long, default_value_t = 128)]
        samples: usize,
        /// Overrides the pattern's `scale` control.
        #[arg(long)]
        scale: Option<f64>,
        /// Overrides the pattern's `octaves` control.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_OCTAVES as i64))]
        octaves: Option<u32>,
    },
    /// List user and factory presets for a pattern.
    Presets { pattern: String },
    /// Save a user preset built from the pattern defaults plus overrides.
    Save {
        pattern: String,
        name: String,
        /// Control override as `key=value`. Repeatable.
        #[arg(long = "set", value_parser = parse_assignment)]
        values: Vec<(String, ParamValue)>,
        /// Also mark the preset as the user default.
        #[arg(long)]
        default: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut store = PresetStore::new(open_storage(cli.store.as_deref())?);

    match &cli.factory {
        Some(path) => run(cli.command, &mut store, &FactoryPresets::new(FileFactoryPresets::new(path))),
        None => run(cli.command, &mut store, &FactoryPresets::new(BundledFactoryPresets::new())),
    }
}

/// Preset storage for `--store`, or an in-memory map. A store file that does
/// not parse is set aside and replaced by an empty one.
fn open_storage(path: Option<&Path>) -> anyhow::Result<Box<dyn Storage>> {
    Ok(match path {
        Some(path) => Box::new(
            FileStorage::open_or_empty(path).with_context(|| format!("Failed to open preset store {:?}", path))?,
        ),
        None => Box::new(MemoryStorage::new()),
    })
}

fn run<S: Storage, F: FactorySource>(
    command: Command,
    store: &mut PresetStore<S>,
    factory: &FactoryPresets<F>,
) -> anyhow::Result<()> {
    match command {
        Command::Trajectory {
            pattern,
            steps,
            dt,
            start,
        } => trajectory(&pattern, steps, dt, start, store, factory),
        Command::Noise {
            samples,
            scale,
            octaves,
        } => noise(samples, scale, octaves, store, factory),
        Command::Presets { pattern } => presets(&pattern, store, factory),
        Command::Save {
            pattern,
            name,
            values,
            default,
        } => save(&pattern, &name, values, default, store),
    }
}

fn lookup_pattern(id: &str) -> anyhow::Result<PatternDefinition> {
    builtin_pattern(id).ok_or_else(|| {
        let known: Vec<String> = builtin_patterns().into_iter().map(|p| p.id).collect();
        anyhow!("Unknown pattern {:?}. Known patterns: {}", id, known.join(", "))
    })
}

fn resolved_values<S: Storage, F: FactorySource>(
    pattern: &PatternDefinition,
    store: &PresetStore<S>,
    factory: &FactoryPresets<F>,
) -> ParamMap {
    let resolver = PresetResolver::new(store, factory);
    let resolved = pollster::block_on(resolver.resolve(&pattern.id));
    match resolved.preset() {
        Some(preset) => log::info!("{}: using {} preset {:?}", pattern.id, resolved.source(), preset.name),
        None => log::info!("{}: using built-in defaults", pattern.id),
    }
    resolved.values(pattern)
}

fn trajectory<S: Storage, F: FactorySource>(
    pattern_id: &str,
    steps: usize,
    dt: Option<f64>,
    start: Point3,
    store: &PresetStore<S>,
    factory: &FactoryPresets<F>,
) -> anyhow::Result<()> {
    let pattern = lookup_pattern(pattern_id)?;
    let values = resolved_values(&pattern, store, factory);
    let Some(attractor) = Attractor::from_parameters(&pattern.id, &values) else {
        bail!("{:?} is not an attractor pattern", pattern.id);
    };
    let dt = dt
        .or_else(|| values.get("dt").and_then(ParamValue::as_f64))
        .unwrap_or(DEFAULT_DT);

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "x,y,z")?;
    let mut diverged = 0usize;
    for p in attractor.trajectory(start, dt).take(steps) {
        if !p.is_finite() {
            diverged += 1;
            continue;
        }
        writeln!(out, "{},{},{}", p.x, p.y, p.z)?;
    }
    out.flush()?;

    if diverged > 0 {
        log::warn!("{} of {} points diverged and were skipped", diverged, steps);
    }
    Ok(())
}

fn noise<S: Storage, F: FactorySource>(
    samples: usize,
    scale: Option<f64>,
    octaves: Option<u32>,
    store: &PresetStore<S>,
    factory: &FactoryPresets<F>,
) -> anyhow::Result<()> {
    let pattern = lookup_pattern("simplex-noise")?;
    let values = resolved_values(&pattern, store, factory);
    let scale = scale
        .or_else(|| values.get("scale").and_then(ParamValue::as_f64))
        .unwrap_or(1.0);
    let octaves = octaves
        .or_else(|| values.get("octaves").and_then(ParamValue::as_f64).map(|o| o as u32))
        .unwrap_or(1);

    let mut cache = NoiseCache::new();
    let generator = cache.generator(&pattern.id);

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "x,value")?;
    for i in 0..samples {
        let x = i as f64 / samples.max(1) as f64 * scale;
        writeln!(out, "{},{}", x, generator.fbm3(x, 0.0, 0.0, octaves))?;
    }
    out.flush()?;
    Ok(())
}

fn presets<S: Storage, F: FactorySource>(
    pattern_id: &str,
    store: &PresetStore<S>,
    factory: &FactoryPresets<F>,
) -> anyhow::Result<()> {
    let pattern = lookup_pattern(pattern_id)?;
    let resolver = PresetResolver::new(store, factory);
    let resolved = pollster::block_on(resolver.resolve(&pattern.id));
    let effective_id = resolved.preset().map(|p| p.id.clone());
    let marker = |id: &str| if effective_id.as_deref() == Some(id) { "*" } else { " " };

    println!("{} ({})", pattern.name, pattern.id);
    println!("  user presets:");
    for preset in store.presets_for(&pattern.id) {
        println!("   {} {} [{}] {}", marker(&preset.id), preset.name, preset.content_hash, preset.created_at.to_rfc3339());
    }
    println!("  factory presets:");
    for preset in pollster::block_on(factory.load_or_empty()).iter().filter(|p| p.generator_type == pattern.id) {
        println!("   {} {} [{}]", marker(&preset.id), preset.name, preset.content_hash);
    }
    println!("  effective default: {}", resolved.source());
    Ok(())
}

fn save<S: Storage>(
    pattern_id: &str,
    name: &str,
    overrides: Vec<(String, ParamValue)>,
    make_default: bool,
    store: &mut PresetStore<S>,
) -> anyhow::Result<()> {
    let pattern = lookup_pattern(pattern_id)?;
    let mut values = pattern.default_values();
    for (key, value) in overrides {
        let Some(control) = pattern.control(&key) else {
            bail!("Pattern {:?} has no control {:?}", pattern.id, key);
        };
        if !control.kind.accepts(&value) {
            bail!("Value {} is not valid for control {:?}", value, key);
        }
        values.insert(key, value);
    }

    let preset = store.save_preset(name, &pattern.id, values)?;
    if make_default {
        store.set_user_default(&preset.id)?;
    }
    println!("{} {}", preset.id, preset.content_hash);
    Ok(())
}

fn parse_point(s: &str) -> Result<Point3, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("{:?}: {}", c, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Point3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z but got {} components", parts.len())),
    }
}

fn parse_assignment(s: &str) -> Result<(String, ParamValue), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    let value = match raw {
        "true" => ParamValue::Bool(true),
        "false" => ParamValue::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(raw.to_string()),
        },
    };
    Ok((key.trim().to_string(), value))
}
