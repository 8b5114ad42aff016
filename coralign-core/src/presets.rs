//! Preset registry: immutable default tables keyed by dataset, split scheme,
//! algorithm, model and scheduler.
//!
//! The registry is an explicit value handed to the resolver. [`PresetRegistry::builtin`]
//! carries the benchmark defaults; additional tables can be loaded from TOML or
//! JSON and layered on top with [`PresetRegistry::extend`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::settings::Template;

/// Every preset table the resolver consults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetRegistry {
    #[serde(default)]
    pub datasets: BTreeMap<String, Template>,
    /// dataset -> split scheme -> template
    #[serde(default)]
    pub splits: BTreeMap<String, BTreeMap<String, Template>>,
    #[serde(default)]
    pub algorithms: BTreeMap<String, Template>,
    #[serde(default)]
    pub loader: Template,
    #[serde(default)]
    pub models: BTreeMap<String, Template>,
    #[serde(default)]
    pub schedulers: BTreeMap<String, Template>,
    #[serde(default)]
    pub swav_datasets: BTreeMap<String, Template>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, name: &str) -> Option<&Template> {
        self.datasets.get(name)
    }

    pub fn split(&self, dataset: &str, scheme: &str) -> Option<&Template> {
        self.splits.get(dataset).and_then(|s| s.get(scheme))
    }

    pub fn algorithm(&self, name: &str) -> Option<&Template> {
        self.algorithms.get(name)
    }

    pub fn loader(&self) -> &Template {
        &self.loader
    }

    pub fn model(&self, name: &str) -> Option<&Template> {
        self.models.get(name)
    }

    pub fn scheduler(&self, name: &str) -> Option<&Template> {
        self.schedulers.get(name)
    }

    pub fn swav_dataset(&self, name: &str) -> Option<&Template> {
        self.swav_datasets.get(name)
    }

    /// Overlay `other` on this registry. Named entries in `other` replace ours;
    /// loader keys are overlaid individually.
    pub fn extend(&mut self, other: PresetRegistry) {
        self.datasets.extend(other.datasets);
        for (dataset, schemes) in other.splits {
            self.splits.entry(dataset).or_default().extend(schemes);
        }
        self.algorithms.extend(other.algorithms);
        self.loader.extend(other.loader);
        self.models.extend(other.models);
        self.schedulers.extend(other.schedulers);
        self.swav_datasets.extend(other.swav_datasets);
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
            }
            .into()
        })
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a registry file; `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// The benchmark defaults shipped with coralign.
    pub fn builtin() -> Self {
        Self {
            datasets: builtin_datasets(),
            splits: builtin_splits(),
            algorithms: builtin_algorithms(),
            loader: template(json!({
                "loader_kwargs": {"num_workers": 4, "pin_memory": true},
                "unlabeled_loader_kwargs": {"num_workers": 8, "pin_memory": true},
                "n_groups_per_batch": 4,
                "unlabeled_n_groups_per_batch": 4,
            })),
            models: builtin_models(),
            schedulers: builtin_schedulers(),
            swav_datasets: builtin_swav_datasets(),
        }
    }
}

fn template(value: Value) -> Template {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Template::new(),
    }
}

fn table(entries: Value) -> BTreeMap<String, Template> {
    match entries {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, template(v))).collect(),
        _ => BTreeMap::new(),
    }
}

fn builtin_datasets() -> BTreeMap<String, Template> {
    table(json!({
        "camelyon17": {
            "split_scheme": "official",
            "model": "densenet121",
            "model_kwargs": {"pretrained": false},
            "transform": "image_base",
            "target_resolution": [96, 96],
            "loss_function": "cross_entropy",
            "groupby_fields": ["hospital"],
            "val_metric": "acc_avg",
            "val_metric_decreasing": false,
            "optimizer": "SGD",
            "optimizer_kwargs": {"momentum": 0.9},
            "scheduler": null,
            "batch_size": 32,
            "lr": 0.001,
            "weight_decay": 0.01,
            "n_epochs": 10,
            "n_groups_per_batch": 2,
            "unlabeled_n_groups_per_batch": 2,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 0.1,
            "dann_penalty_weight": 0.1,
            "dann_featurizer_lr": 0.0001,
            "dann_classifier_lr": 0.001,
            "dann_discriminator_lr": 0.001,
            "algo_log_metric": "accuracy",
            "process_outputs_function": "multiclass_logits_to_pred",
            "process_pseudolabels_function": "pseudolabel_multiclass_logits",
        },
        "civilcomments": {
            "split_scheme": "official",
            "model": "distilbert-base-uncased",
            "transform": "bert",
            "loss_function": "cross_entropy",
            "groupby_fields": ["black", "y"],
            "val_metric": "acc_wg",
            "val_metric_decreasing": false,
            "batch_size": 16,
            "lr": 1e-05,
            "weight_decay": 0.01,
            "n_epochs": 5,
            "n_groups_per_batch": 1,
            "unlabeled_n_groups_per_batch": 1,
            "coral_penalty_weight": 10.0,
            "dann_penalty_weight": 1.0,
            "dann_featurizer_lr": 1e-06,
            "dann_classifier_lr": 1e-05,
            "dann_discriminator_lr": 1e-05,
            "max_token_length": 300,
            "irm_lambda": 1.0,
            "loader_kwargs": {"num_workers": 1, "pin_memory": true},
            "unlabeled_loader_kwargs": {"num_workers": 1, "pin_memory": true},
            "algo_log_metric": "accuracy",
            "process_outputs_function": "multiclass_logits_to_pred",
            "process_pseudolabels_function": "pseudolabel_multiclass_logits",
        },
        "fmow": {
            "split_scheme": "official",
            "dataset_kwargs": {"seed": 111},
            "model": "densenet121",
            "model_kwargs": {"pretrained": true},
            "transform": "image_base",
            "loss_function": "cross_entropy",
            "groupby_fields": ["year"],
            "val_metric": "acc_worst_region",
            "val_metric_decreasing": false,
            "optimizer": "Adam",
            "scheduler": "StepLR",
            "scheduler_kwargs": {"gamma": 0.96},
            "batch_size": 32,
            "lr": 0.0001,
            "weight_decay": 0.0,
            "n_epochs": 60,
            "n_groups_per_batch": 8,
            "unlabeled_n_groups_per_batch": 8,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 0.1,
            "dann_penalty_weight": 1.0,
            "dann_featurizer_lr": 1e-05,
            "dann_classifier_lr": 0.0001,
            "dann_discriminator_lr": 0.0001,
            "algo_log_metric": "accuracy",
            "process_outputs_function": "multiclass_logits_to_pred",
            "process_pseudolabels_function": "pseudolabel_multiclass_logits",
        },
        "iwildcam": {
            "loss_function": "cross_entropy",
            "val_metric": "F1-macro_all",
            "model_kwargs": {"pretrained": true},
            "transform": "image_base",
            "target_resolution": [448, 448],
            "val_metric_decreasing": false,
            "algo_log_metric": "accuracy",
            "model": "resnet50",
            "lr": 3e-05,
            "weight_decay": 0.0,
            "batch_size": 16,
            "n_epochs": 12,
            "optimizer": "Adam",
            "split_scheme": "official",
            "scheduler": null,
            "groupby_fields": ["location"],
            "n_groups_per_batch": 2,
            "unlabeled_n_groups_per_batch": 2,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 10.0,
            "dann_penalty_weight": 0.1,
            "dann_featurizer_lr": 3e-06,
            "dann_classifier_lr": 3e-05,
            "dann_discriminator_lr": 3e-05,
            "no_group_logging": true,
            "process_outputs_function": "multiclass_logits_to_pred",
            "process_pseudolabels_function": "pseudolabel_multiclass_logits",
        },
        "poverty": {
            "split_scheme": "official",
            "dataset_kwargs": {"no_nl": false, "fold": "A", "use_ood_val": true},
            "model": "resnet18_ms",
            "model_kwargs": {"num_channels": 8},
            "transform": "poverty",
            "loss_function": "mse",
            "groupby_fields": ["country"],
            "val_metric": "r_wg",
            "val_metric_decreasing": false,
            "algo_log_metric": "mse",
            "optimizer": "Adam",
            "scheduler": "StepLR",
            "scheduler_kwargs": {"gamma": 0.96},
            "batch_size": 64,
            "lr": 0.001,
            "weight_decay": 0.0,
            "n_epochs": 200,
            "n_groups_per_batch": 8,
            "unlabeled_n_groups_per_batch": 4,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 0.1,
            "dann_penalty_weight": 0.1,
            "dann_featurizer_lr": 0.0001,
            "dann_classifier_lr": 0.001,
            "dann_discriminator_lr": 0.001,
            "process_outputs_function": null,
        },
        "waterbirds": {
            "split_scheme": "official",
            "model": "resnet50",
            "transform": "image_resize_and_center_crop",
            "resize_scale": 1.1428571428571428,
            "model_kwargs": {"pretrained": true},
            "loss_function": "cross_entropy",
            "groupby_fields": ["background", "y"],
            "val_metric": "acc_wg",
            "val_metric_decreasing": false,
            "algo_log_metric": "accuracy",
            "optimizer": "SGD",
            "optimizer_kwargs": {"momentum": 0.9},
            "scheduler": null,
            "batch_size": 128,
            "lr": 1e-05,
            "weight_decay": 1.0,
            "n_epochs": 300,
            "process_outputs_function": "multiclass_logits_to_pred",
        },
        "celebA": {
            "split_scheme": "official",
            "model": "resnet50",
            "transform": "image_base",
            "model_kwargs": {"pretrained": true},
            "loss_function": "cross_entropy",
            "groupby_fields": ["male", "y"],
            "val_metric": "acc_wg",
            "val_metric_decreasing": false,
            "optimizer": "SGD",
            "optimizer_kwargs": {"momentum": 0.9},
            "scheduler": null,
            "batch_size": 64,
            "lr": 0.001,
            "weight_decay": 0.0,
            "n_epochs": 200,
            "algo_log_metric": "accuracy",
            "process_outputs_function": "multiclass_logits_to_pred",
        },
        "domainnet": {
            "split_scheme": "official",
            "dataset_kwargs": {"source_domain": "real", "target_domain": "sketch", "use_sentry": false},
            "model": "resnet50",
            "model_kwargs": {"pretrained": true},
            "transform": "image_resize",
            "resize_scale": 1.0,
            "target_resolution": [224, 224],
            "loss_function": "cross_entropy",
            "groupby_fields": ["domain"],
            "val_metric": "acc_avg",
            "val_metric_decreasing": false,
            "batch_size": 96,
            "optimizer": "SGD",
            "optimizer_kwargs": {"momentum": 0.9},
            "lr": 0.0007035737028722148,
            "weight_decay": 1e-4,
            "n_epochs": 25,
            "n_groups_per_batch": 4,
            "unlabeled_n_groups_per_batch": 1,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 1.0,
            "dann_penalty_weight": 1.0,
            "dann_featurizer_lr": 0.001,
            "dann_classifier_lr": 0.01,
            "dann_discriminator_lr": 0.01,
            "algo_log_metric": "accuracy",
            "process_outputs_function": "multiclass_logits_to_pred",
            "process_pseudolabels_function": "pseudolabel_multiclass_logits",
        },
        "rxrx1": {
            "split_scheme": "official",
            "model": "resnet50",
            "model_kwargs": {"pretrained": true},
            "transform": "rxrx1",
            "target_resolution": [256, 256],
            "loss_function": "cross_entropy",
            "groupby_fields": ["experiment"],
            "val_metric": "acc_avg",
            "val_metric_decreasing": false,
            "algo_log_metric": "accuracy",
            "optimizer": "Adam",
            "scheduler": "cosine_schedule_with_warmup",
            "scheduler_kwargs": {"num_warmup_steps": 5415},
            "batch_size": 75,
            "lr": 0.001,
            "weight_decay": 1e-5,
            "n_groups_per_batch": 5,
            "n_epochs": 90,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 0.1,
            "process_outputs_function": "multiclass_logits_to_pred",
        },
        "ogb-molpcba": {
            "split_scheme": "official",
            "model": "gin-virtual",
            "model_kwargs": {"dropout": 0.5},
            "loss_function": "multitask_bce",
            "groupby_fields": ["scaffold"],
            "val_metric": "ap",
            "val_metric_decreasing": false,
            "optimizer": "Adam",
            "batch_size": 32,
            "lr": 1e-03,
            "weight_decay": 0.0,
            "n_epochs": 100,
            "n_groups_per_batch": 4,
            "unlabeled_n_groups_per_batch": 4,
            "irm_lambda": 1.0,
            "coral_penalty_weight": 0.1,
            "dann_penalty_weight": 0.1,
            "dann_featurizer_lr": 1e-03,
            "dann_classifier_lr": 1e-02,
            "dann_discriminator_lr": 1e-02,
            "no_group_logging": true,
            "algo_log_metric": "multitask_binary_accuracy",
            "process_outputs_function": null,
        },
    }))
}

fn builtin_splits() -> BTreeMap<String, BTreeMap<String, Template>> {
    let mut splits = BTreeMap::new();
    splits.insert(
        "camelyon17".to_string(),
        table(json!({
            "mixed-to-test": {"dataset_kwargs": {"mixed_fraction": 0.1}},
        })),
    );
    splits.insert(
        "fmow".to_string(),
        table(json!({
            "mixed-to-test": {"dataset_kwargs": {"oracle_training_set": true}},
        })),
    );
    splits.insert(
        "poverty".to_string(),
        table(json!({
            "mixed-to-test": {"dataset_kwargs": {"use_ood_val": false}},
        })),
    );
    splits
}

fn builtin_algorithms() -> BTreeMap<String, Template> {
    table(json!({
        "ERM": {
            "train_loader": "standard",
            "uniform_over_groups": false,
            "eval_loader": "standard",
            "randaugment_n": 2,
        },
        "groupDRO": {
            "train_loader": "standard",
            "uniform_over_groups": true,
            "distinct_groups": true,
            "eval_loader": "standard",
            "group_dro_step_size": 0.01,
        },
        "deepCORAL": {
            "train_loader": "group",
            "uniform_over_groups": true,
            "distinct_groups": true,
            "eval_loader": "standard",
            "coral_penalty_weight": 1.0,
            "randaugment_n": 2,
            "additional_train_transform": "randaugment",
        },
        "IRM": {
            "train_loader": "group",
            "uniform_over_groups": true,
            "distinct_groups": true,
            "eval_loader": "standard",
            "irm_lambda": 100.0,
            "irm_penalty_anneal_iters": 500,
        },
        "DANN": {
            "train_loader": "group",
            "uniform_over_groups": true,
            "distinct_groups": true,
            "eval_loader": "standard",
            "randaugment_n": 2,
            "additional_train_transform": "randaugment",
        },
        "AFN": {
            "train_loader": "standard",
            "uniform_over_groups": false,
            "eval_loader": "standard",
            "use_hafn": false,
            "afn_penalty_weight": 0.01,
            "safn_delta_r": 1.0,
            "hafn_r": 1.0,
            "additional_train_transform": "randaugment",
            "randaugment_n": 2,
        },
        "FixMatch": {
            "train_loader": "standard",
            "uniform_over_groups": false,
            "eval_loader": "standard",
            "self_training_lambda": 1,
            "self_training_threshold": 0.7,
            "scheduler": "FixMatchLR",
            "randaugment_n": 2,
            "additional_train_transform": "randaugment",
        },
        "PseudoLabel": {
            "train_loader": "standard",
            "uniform_over_groups": false,
            "eval_loader": "standard",
            "self_training_lambda": 1,
            "self_training_threshold": 0.7,
            "pseudolabel_T2": 0.4,
            "scheduler": "FixMatchLR",
            "randaugment_n": 2,
            "additional_train_transform": "randaugment",
        },
        "NoisyStudent": {
            "train_loader": "standard",
            "uniform_over_groups": false,
            "eval_loader": "standard",
            "noisystudent_add_dropout": true,
            "noisystudent_dropout_rate": 0.5,
            "scheduler": "FixMatchLR",
            "randaugment_n": 2,
            "additional_train_transform": "randaugment",
        },
    }))
}

fn builtin_models() -> BTreeMap<String, Template> {
    table(json!({
        "bert-base-uncased": {
            "optimizer": "AdamW",
            "max_grad_norm": 1.0,
            "scheduler": "linear_schedule_with_warmup",
        },
        "distilbert-base-uncased": {
            "optimizer": "AdamW",
            "max_grad_norm": 1.0,
            "scheduler": "linear_schedule_with_warmup",
        },
        "code-gpt-py": {
            "optimizer": "AdamW",
            "max_grad_norm": 1.0,
            "scheduler": "linear_schedule_with_warmup",
        },
        "densenet121": {
            "model_kwargs": {"pretrained": true},
            "target_resolution": [224, 224],
        },
        "wideresnet50": {
            "model_kwargs": {"pretrained": true},
            "target_resolution": [224, 224],
        },
        "resnet50": {
            "model_kwargs": {"pretrained": true},
            "target_resolution": [224, 224],
        },
        "resnet18_ms": {
            "target_resolution": [224, 224],
        },
        "gin-virtual": {},
        "logistic_regression": {},
        "unet-seq": {
            "optimizer": "Adam",
        },
        "fasterrcnn": {
            "model_kwargs": {
                "pretrained_model": true,
                "pretrained_backbone": true,
                "min_size": 1024,
                "max_size": 1024,
            },
        },
    }))
}

fn builtin_schedulers() -> BTreeMap<String, Template> {
    table(json!({
        "linear_schedule_with_warmup": {
            "scheduler_kwargs": {"num_warmup_steps": 0},
        },
        "cosine_schedule_with_warmup": {
            "scheduler_kwargs": {"num_warmup_steps": 0},
        },
        "ReduceLROnPlateau": {
            "scheduler_kwargs": {},
        },
        "StepLR": {
            "scheduler_kwargs": {"step_size": 1},
        },
        "FixMatchLR": {
            "scheduler_kwargs": {},
        },
        "MultiStepLR": {
            "scheduler_kwargs": {"gamma": 0.1},
        },
    }))
}

fn builtin_swav_datasets() -> BTreeMap<String, Template> {
    table(json!({
        "camelyon17": {
            "split_scheme": "official",
            "model": "densenet121",
            "splits": ["train_unlabeled", "val_unlabeled", "test_unlabeled"],
            "size_crops": [96, 32],
            "nmb_crops": [2, 6],
            "min_scale_crops": [0.14, 0.05],
            "max_scale_crops": [1.0, 0.14],
            "nmb_prototypes": 20,
            "queue_length": 3840,
            "epoch_queue_starts": 500,
            "n_epochs": 400,
            "warmup_epochs": 0,
            "base_lr": 0.6,
            "min_lr": 0.0006,
            "batch_size": 32,
        },
        "iwildcam": {
            "split_scheme": "official",
            "model": "resnet50",
            "splits": ["extra_unlabeled"],
            "size_crops": [448, 96],
            "nmb_crops": [2, 6],
            "min_scale_crops": [0.14, 0.05],
            "max_scale_crops": [1.0, 0.14],
            "nmb_prototypes": 3000,
            "queue_length": 0,
            "epoch_queue_starts": 500,
            "n_epochs": 60,
            "warmup_epochs": 0,
            "base_lr": 0.6,
            "min_lr": 0.0006,
            "batch_size": 16,
        },
        "fmow": {
            "split_scheme": "official",
            "model": "densenet121",
            "splits": ["train_unlabeled", "val_unlabeled", "test_unlabeled"],
            "size_crops": [224, 96],
            "nmb_crops": [2, 6],
            "min_scale_crops": [0.14, 0.05],
            "max_scale_crops": [1.0, 0.14],
            "nmb_prototypes": 620,
            "queue_length": 2560,
            "epoch_queue_starts": 500,
            "n_epochs": 400,
            "warmup_epochs": 0,
            "base_lr": 0.6,
            "min_lr": 0.0006,
            "batch_size": 32,
        },
        "poverty": {
            "split_scheme": "official",
            "model": "resnet18_ms",
            "splits": ["train_unlabeled", "val_unlabeled", "test_unlabeled"],
            "size_crops": [224, 96],
            "nmb_crops": [2, 6],
            "min_scale_crops": [0.14, 0.05],
            "max_scale_crops": [1.0, 0.14],
            "nmb_prototypes": 150,
            "queue_length": 1920,
            "epoch_queue_starts": 500,
            "n_epochs": 200,
            "warmup_epochs": 0,
            "base_lr": 0.6,
            "min_lr": 0.0006,
            "batch_size": 64,
        },
    }))
}
