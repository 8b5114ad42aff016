//! The preset cascade: fills an under-specified [`Settings`] from the
//! registry's dataset, split, algorithm, loader, model and scheduler tables.
//!
//! Precedence is first-writer-wins. User-supplied fields beat every preset, and
//! an earlier layer beats a later one because later layers skip fields that are
//! already set.

use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::populate::populate;
use crate::presets::PresetRegistry;
use crate::settings::{Settings, Template};

/// Fields that must be set once the cascade has run.
pub const REQUIRED_FIELDS: &[&str] = &[
    "split_scheme",
    "train_loader",
    "uniform_over_groups",
    "batch_size",
    "eval_loader",
    "model",
    "loss_function",
    "val_metric",
    "val_metric_decreasing",
    "n_epochs",
    "optimizer",
    "lr",
    "weight_decay",
];

/// Grouping choice that pins both per-batch group counts to one.
pub const FROM_SOURCE_DOMAIN: &str = "from_source_domain";

const GROUP_COUNT_FIELDS: [&str; 2] = ["n_groups_per_batch", "unlabeled_n_groups_per_batch"];

/// Resolves settings against a preset registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a PresetRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a PresetRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a PresetRegistry {
        self.registry
    }

    /// Populate hyperparameters with the defaults implied by the choice of
    /// dataset, split scheme, algorithm, model and scheduler.
    pub fn resolve(&self, mut settings: Settings) -> Result<Settings> {
        let dataset = settings.require_str("dataset")?.to_string();
        let algorithm = settings.require_str("algorithm")?.to_string();

        check_group_counts(&mut settings)?;
        if algorithm == "DANN" && settings.is_set("lr") {
            return Err(ConfigError::incompatible(
                "Cannot pass in a value for lr. For DANN, only dann_classifier_lr, \
                 dann_featurizer_lr and dann_discriminator_lr are valid learning rate parameters.",
            )
            .into());
        }

        let preset = self
            .registry
            .dataset(&dataset)
            .ok_or_else(|| ConfigError::unknown_preset("dataset", &dataset))?;
        apply_layer(&mut settings, "dataset", &dataset, preset)?;

        if let Some(scheme) = settings.get_str("split_scheme").map(str::to_string) {
            if let Some(preset) = self.registry.split(&dataset, &scheme) {
                apply_layer(&mut settings, "split", &scheme, preset)?;
            }
        }

        let preset = self
            .registry
            .algorithm(&algorithm)
            .ok_or_else(|| ConfigError::unknown_preset("algorithm", &algorithm))?;
        apply_layer(&mut settings, "algorithm", &algorithm, preset)?;

        apply_layer(&mut settings, "loader", "default", self.registry.loader())?;

        if let Some(model) = optional_choice(&settings, "model")? {
            let preset = self
                .registry
                .model(&model)
                .ok_or_else(|| ConfigError::unknown_preset("model", &model))?;
            apply_layer(&mut settings, "model", &model, preset)?;
        }

        if let Some(scheduler) = optional_choice(&settings, "scheduler")? {
            let preset = self
                .registry
                .scheduler(&scheduler)
                .ok_or_else(|| ConfigError::unknown_preset("scheduler", &scheduler))?;
            apply_layer(&mut settings, "scheduler", &scheduler, preset)?;
        }

        if !settings.is_set("groupby_fields") {
            settings.set("no_group_logging", true);
        }
        let no_group_logging = truthy(settings.get("no_group_logging"));
        settings.set("no_group_logging", no_group_logging);

        check_required(&settings, REQUIRED_FIELDS)?;

        tracing::info!(
            dataset = %dataset,
            algorithm = %algorithm,
            fields = settings.len(),
            "resolved experiment settings"
        );
        Ok(settings)
    }

    /// Populate defaults for SwAV pretraining.
    pub fn resolve_swav(&self, mut settings: Settings) -> Result<Settings> {
        let dataset = settings.require_str("dataset")?.to_string();

        if !settings.is_set("final_lr") {
            if let Some(lr) = settings.get_f64("lr").filter(|lr| *lr != 0.0) {
                settings.set("final_lr", lr / 1000.0);
            }
        }

        let preset = self
            .registry
            .swav_dataset(&dataset)
            .ok_or_else(|| ConfigError::unknown_preset("swav dataset", &dataset))?;
        apply_layer(&mut settings, "swav dataset", &dataset, preset)?;

        let warmup_epochs = settings.require_f64("warmup_epochs")?;
        let n_epochs = settings.require_f64("n_epochs")?;
        if warmup_epochs >= n_epochs {
            return Err(ConfigError::invalid(format!(
                "The number of warmup_epochs ({warmup_epochs}) cannot be greater than n_epochs ({n_epochs})."
            ))
            .into());
        }

        tracing::info!(dataset = %dataset, fields = settings.len(), "resolved SwAV settings");
        Ok(settings)
    }
}

fn apply_layer(settings: &mut Settings, layer: &str, name: &str, preset: &Template) -> Result<()> {
    tracing::debug!(layer, name, fields = preset.len(), "applying preset layer");
    populate(settings, Some(preset), false)
}

/// `groupby_fields == ["from_source_domain"]` implies one group per batch.
fn check_group_counts(settings: &mut Settings) -> Result<()> {
    let from_source_domain = settings
        .get_str_list("groupby_fields")
        .is_some_and(|fields| fields == [FROM_SOURCE_DOMAIN]);
    if !from_source_domain {
        return Ok(());
    }

    for field in GROUP_COUNT_FIELDS {
        match settings.value(field) {
            None => settings.set(field, 1),
            Some(value) if value.as_f64() == Some(1.0) => {}
            Some(value) => {
                return Err(ConfigError::incompatible(format!(
                    "{FROM_SOURCE_DOMAIN} was specified for groupby_fields, but {field} \
                     was {value}, when it should be 1."
                ))
                .into());
            }
        }
    }
    Ok(())
}

/// A model or scheduler choice. Empty strings and `false` mean "none chosen".
fn optional_choice(settings: &Settings, field: &str) -> Result<Option<String>> {
    match settings.value(field) {
        None => Ok(None),
        Some(value) if !truthy(Some(value)) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(other) => Err(ConfigError::invalid(format!(
            "{field} must name a preset, found {other}"
        ))
        .into()),
    }
}

fn check_required(settings: &Settings, fields: &[&str]) -> Result<()> {
    match fields.iter().find(|field| !settings.is_set(field)) {
        Some(field) => Err(ConfigError::missing(*field).into()),
        None => Ok(()),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}
