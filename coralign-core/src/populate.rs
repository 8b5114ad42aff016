//! Template population with first-writer-wins semantics.

use serde_json::{Map, Value};

use crate::error::{ConfigError, ConflictError, CoralignError, Result};
use crate::settings::{Settings, Template, kind_name, values_match};

/// Fill every field of `template` that is unset in `settings`.
///
/// Option groups (object-valued template entries) are merged sub-key by sub-key
/// instead of replacing the whole group. Already-set values are never
/// overwritten; with `strict` a differing value raises [`ConflictError`].
pub fn populate(settings: &mut Settings, template: Option<&Template>, strict: bool) -> Result<()> {
    let Some(template) = template else {
        return Ok(());
    };

    for (key, val) in template {
        match val {
            Value::Object(group) => populate_group(settings, key, group, strict)?,
            _ => {
                let slot = settings.entry(key.clone());
                if slot.is_null() {
                    *slot = val.clone();
                } else if strict && !values_match(slot, val) {
                    return Err(ConflictError {
                        key: key.clone(),
                        sub_key: None,
                        expected: val.clone(),
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

fn populate_group(
    settings: &mut Settings,
    key: &str,
    group: &Map<String, Value>,
    strict: bool,
) -> Result<()> {
    let slot = settings.entry(key.to_string());
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    let found = kind_name(slot);
    let Some(existing) = slot.as_object_mut() else {
        return Err(CoralignError::Config(ConfigError::TypeMismatch {
            field: key.to_string(),
            found: found.to_string(),
        }));
    };

    for (sub_key, sub_val) in group {
        match existing.get(sub_key) {
            None | Some(Value::Null) => {
                existing.insert(sub_key.clone(), sub_val.clone());
            }
            Some(current) if strict && !values_match(current, sub_val) => {
                return Err(ConflictError {
                    key: key.to_string(),
                    sub_key: Some(sub_key.clone()),
                    expected: sub_val.clone(),
                }
                .into());
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Assert that `settings` agrees with every value in `template`.
///
/// Runs a strict population on a copy, so the caller's settings are untouched
/// whether or not the check passes.
pub fn check_compatibility(settings: &Settings, template: &Template) -> Result<()> {
    let mut scratch = settings.clone();
    populate(&mut scratch, Some(template), true).inspect_err(|err| {
        tracing::warn!(error = %err, "settings are incompatible with template");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template(value: Value) -> Template {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fills_missing_and_null_fields() {
        let mut settings = Settings::new().with("lr", Value::Null).with("batch_size", 16);
        let t = template(json!({"lr": 0.01, "batch_size": 32, "optimizer": "SGD"}));
        populate(&mut settings, Some(&t), false).unwrap();

        assert_eq!(settings.get_f64("lr"), Some(0.01));
        assert_eq!(settings.get_u64("batch_size"), Some(16));
        assert_eq!(settings.get_str("optimizer"), Some("SGD"));
    }

    #[test]
    fn test_merges_option_groups_per_sub_key() {
        let mut settings =
            Settings::new().with("optimizer_kwargs", json!({"momentum": 0.5, "nesterov": null}));
        let t = template(json!({
            "optimizer_kwargs": {"momentum": 0.9, "nesterov": true, "dampening": 0}
        }));
        populate(&mut settings, Some(&t), false).unwrap();

        assert_eq!(
            settings.get("optimizer_kwargs"),
            Some(&json!({"momentum": 0.5, "nesterov": true, "dampening": 0}))
        );
    }

    #[test]
    fn test_missing_option_group_is_created() {
        let mut settings = Settings::new();
        let t = template(json!({"loader_kwargs": {"num_workers": 4}}));
        populate(&mut settings, Some(&t), false).unwrap();
        assert_eq!(
            settings.get("loader_kwargs"),
            Some(&json!({"num_workers": 4}))
        );
    }

    #[test]
    fn test_scalar_where_group_expected_is_rejected() {
        let mut settings = Settings::new().with("model_kwargs", 3);
        let t = template(json!({"model_kwargs": {"pretrained": true}}));
        let err = populate(&mut settings, Some(&t), false).unwrap_err();
        assert!(matches!(
            err,
            CoralignError::Config(ConfigError::TypeMismatch { ref field, .. }) if field == "model_kwargs"
        ));
    }

    #[test]
    fn test_absent_template_is_noop() {
        let mut settings = Settings::new().with("lr", 0.1);
        let before = settings.clone();
        populate(&mut settings, None, true).unwrap();
        assert_eq!(settings, before);
    }

    #[test]
    fn test_strict_raises_on_differing_value() {
        let mut settings = Settings::new().with("optimizer", "Adam");
        let t = template(json!({"optimizer": "SGD"}));
        let err = populate(&mut settings, Some(&t), true).unwrap_err();
        match err {
            CoralignError::Conflict(conflict) => {
                assert_eq!(conflict.key, "optimizer");
                assert_eq!(conflict.sub_key, None);
                assert_eq!(conflict.expected, json!("SGD"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_strict_raises_on_differing_sub_key() {
        let mut settings = Settings::new().with("optimizer_kwargs", json!({"momentum": 0.5}));
        let t = template(json!({"optimizer_kwargs": {"momentum": 0.9}}));
        let err = populate(&mut settings, Some(&t), true).unwrap_err();
        assert!(matches!(
            err,
            CoralignError::Conflict(ConflictError { ref sub_key, .. }) if sub_key.as_deref() == Some("momentum")
        ));
    }

    #[test]
    fn test_strict_accepts_numerically_equal_values() {
        let mut settings = Settings::new().with("n_epochs", 5);
        let t = template(json!({"n_epochs": 5.0}));
        populate(&mut settings, Some(&t), true).unwrap();
        assert_eq!(settings.get_u64("n_epochs"), Some(5));
    }

    #[test]
    fn test_non_strict_ignores_differences() {
        let mut settings = Settings::new().with("optimizer", "Adam");
        let t = template(json!({"optimizer": "SGD"}));
        populate(&mut settings, Some(&t), false).unwrap();
        assert_eq!(settings.get_str("optimizer"), Some("Adam"));
    }

    #[test]
    fn test_check_compatibility_leaves_settings_untouched() {
        let settings = Settings::new().with("optimizer", "SGD");
        let t = template(json!({"optimizer": "SGD", "lr": 0.1}));
        check_compatibility(&settings, &t).unwrap();
        assert!(!settings.is_set("lr"));

        let t = template(json!({"optimizer": "Adam"}));
        assert!(check_compatibility(&settings, &t).is_err());
    }
}
