//! Layered settings loading.
//!
//! Uses `figment` for layered sources: settings file -> environment -> explicit
//! overrides (usually command-line flags). The result is the user-supplied
//! [`Settings`] that the preset cascade then completes.

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use std::path::Path;

use crate::error::ConfigError;
use crate::settings::Settings;

/// Environment variable prefix, e.g. `CORALIGN_LR=0.01` or
/// `CORALIGN_OPTIMIZER_KWARGS__MOMENTUM=0.9`.
pub const ENV_PREFIX: &str = "CORALIGN_";

/// Load user settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (null overrides are ignored)
/// 2. Environment variables (prefixed with `CORALIGN_`, nested with `__`)
/// 3. The settings file, TOML or JSON by extension
pub fn load_settings(file: Option<&Path>, overrides: &Settings) -> Result<Settings, ConfigError> {
    let mut figment = Figment::new();

    if let Some(path) = file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        figment = if is_json {
            figment.merge(Json::file(path))
        } else {
            figment.merge(Toml::file(path))
        };
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let explicit: Settings = overrides
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !explicit.is_empty() {
        figment = figment.merge(Serialized::defaults(explicit));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Load a template file (TOML or JSON by extension) for compatibility checks.
pub fn load_template(path: &Path) -> Result<crate::settings::Template, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let figment = if is_json {
        Figment::from(Json::file(path))
    } else {
        Figment::from(Toml::file(path))
    };
    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serde_json::json;

    #[test]
    fn test_file_env_and_overrides_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "experiment.toml",
                r#"
                dataset = "camelyon17"
                algorithm = "ERM"
                lr = 0.1
                batch_size = 16

                [optimizer_kwargs]
                momentum = 0.5
                "#,
            )?;
            jail.set_env("CORALIGN_LR", "0.05");
            jail.set_env("CORALIGN_OPTIMIZER_KWARGS__NESTEROV", "true");

            let overrides = Settings::new()
                .with("algorithm", "deepCORAL")
                .with("n_epochs", serde_json::Value::Null);
            let settings = load_settings(Some(Path::new("experiment.toml")), &overrides)
                .map_err(|e| e.to_string())?;

            assert_eq!(settings.get_str("dataset"), Some("camelyon17"));
            assert_eq!(settings.get_str("algorithm"), Some("deepCORAL"));
            assert_eq!(settings.get_f64("lr"), Some(0.05));
            assert_eq!(settings.get_u64("batch_size"), Some(16));
            assert_eq!(
                settings.get("optimizer_kwargs"),
                Some(&json!({"momentum": 0.5, "nesterov": true}))
            );
            assert!(!settings.is_set("n_epochs"));
            Ok(())
        });
    }

    #[test]
    fn test_json_settings_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "experiment.json",
                r#"{"dataset": "fmow", "groupby_fields": ["region", "year"]}"#,
            )?;
            let settings = load_settings(Some(Path::new("experiment.json")), &Settings::new())
                .map_err(|e| e.to_string())?;
            assert_eq!(
                settings.get_str_list("groupby_fields"),
                Some(vec!["region", "year"])
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_settings(Some(Path::new("/nonexistent/experiment.toml")), &Settings::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_template() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "deployed.toml",
                r#"
                optimizer = "SGD"
                [optimizer_kwargs]
                momentum = 0.9
                "#,
            )?;
            let template =
                load_template(Path::new("deployed.toml")).map_err(|e| e.to_string())?;
            assert_eq!(template["optimizer"], json!("SGD"));
            assert_eq!(template["optimizer_kwargs"], json!({"momentum": 0.9}));
            Ok(())
        });
    }
}
