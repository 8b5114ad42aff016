//! CLI subcommand handlers.
//!
//! Handlers return the text to print so they can be tested without a terminal.

use anyhow::{Context, bail};
use serde_json::Value;
use std::path::Path;

use coralign_core::{
    PresetRegistry, Resolver, Settings, check_compatibility, load_settings, load_template,
};

use crate::{Commands, InputArgs, OutputFormat, PresetKind};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Resolve {
            dataset,
            algorithm,
            input,
        } => handle_resolve(dataset, algorithm, &input),
        Commands::Swav { dataset, input } => handle_swav(dataset, &input),
        Commands::Check { config, template } => handle_check(&config, &template),
        Commands::Presets { kind, presets } => {
            let registry = load_registry(presets.as_deref())?;
            Ok(list_presets(&registry, kind).join("\n"))
        }
    }
}

fn handle_resolve(
    dataset: Option<String>,
    algorithm: Option<String>,
    input: &InputArgs,
) -> anyhow::Result<String> {
    let mut overrides = parse_overrides(&input.overrides)?;
    if let Some(dataset) = dataset {
        overrides.set("dataset", dataset);
    }
    if let Some(algorithm) = algorithm {
        overrides.set("algorithm", algorithm);
    }

    let settings = load_settings(input.config.as_deref(), &overrides)
        .context("Failed to load settings")?;
    let registry = load_registry(input.presets.as_deref())?;
    let resolved = Resolver::new(&registry)
        .resolve(settings)
        .context("Failed to resolve settings")?;
    render(&resolved, input.format)
}

fn handle_swav(dataset: Option<String>, input: &InputArgs) -> anyhow::Result<String> {
    let mut overrides = parse_overrides(&input.overrides)?;
    if let Some(dataset) = dataset {
        overrides.set("dataset", dataset);
    }

    let settings = load_settings(input.config.as_deref(), &overrides)
        .context("Failed to load settings")?;
    let registry = load_registry(input.presets.as_deref())?;
    let resolved = Resolver::new(&registry)
        .resolve_swav(settings)
        .context("Failed to resolve SwAV settings")?;
    render(&resolved, input.format)
}

fn handle_check(config: &Path, template: &Path) -> anyhow::Result<String> {
    let settings = load_settings(Some(config), &Settings::new())
        .with_context(|| format!("Failed to load settings from {}", config.display()))?;
    let template = load_template(template)
        .with_context(|| format!("Failed to load template from {}", template.display()))?;

    check_compatibility(&settings, &template).context("Settings are not compatible")?;
    Ok(format!(
        "Compatible: {} template fields agree with {}",
        template.len(),
        config.display()
    ))
}

/// Built-in presets, extended by a user preset file when given.
fn load_registry(path: Option<&Path>) -> anyhow::Result<PresetRegistry> {
    let mut registry = PresetRegistry::builtin();
    if let Some(path) = path {
        let extra = PresetRegistry::load(path)
            .with_context(|| format!("Failed to load presets from {}", path.display()))?;
        tracing::debug!(path = %path.display(), datasets = extra.datasets.len(), "loaded extra presets");
        registry.extend(extra);
    }
    Ok(registry)
}

fn list_presets(registry: &PresetRegistry, kind: PresetKind) -> Vec<String> {
    match kind {
        PresetKind::Datasets => registry.datasets.keys().cloned().collect(),
        PresetKind::Algorithms => registry.algorithms.keys().cloned().collect(),
        PresetKind::Models => registry.models.keys().cloned().collect(),
        PresetKind::Schedulers => registry.schedulers.keys().cloned().collect(),
        PresetKind::Swav => registry.swav_datasets.keys().cloned().collect(),
        PresetKind::Splits => registry
            .splits
            .iter()
            .flat_map(|(dataset, schemes)| {
                schemes.keys().map(move |scheme| format!("{dataset}/{scheme}"))
            })
            .collect(),
    }
}

/// Parse `KEY=VALUE` pairs. Values are JSON when they parse as JSON and
/// plain strings otherwise.
fn parse_overrides(pairs: &[String]) -> anyhow::Result<Settings> {
    let mut settings = Settings::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid override '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid override '{pair}': empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        settings.set(key, value);
    }
    Ok(settings)
}

fn render(settings: &Settings, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(settings)?),
        OutputFormat::Toml => {
            // TOML has no null; unset fields are left out.
            let value = strip_nulls(settings.to_value());
            Ok(toml::to_string_pretty(&value)?)
        }
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}
