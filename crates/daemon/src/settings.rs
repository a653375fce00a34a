// Settings loading
// Optional config file layered under RESQ_* environment variables

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use resq_core::ResqConfig;
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "RESQ";

/// Load settings from `path` (if any) and the process environment
pub fn load_settings(path: Option<&Path>) -> Result<ResqConfig> {
    load_settings_from(path, None)
}

/// Load settings with an explicit environment map instead of the process one
///
/// Keys are `RESQ_<FIELD>`, e.g. `RESQ_MAX_WORKERS=8` or
/// `RESQ_QUEUES=critical,default`.
pub fn load_settings_from(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<ResqConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let environment = Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("queues")
        .source(env);

    let settings: ResqConfig = builder
        .add_source(environment)
        .build()
        .context("Failed to read settings")?
        .try_deserialize()
        .context("Invalid settings")?;

    settings.validate()?;
    debug!(?settings, "Settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = load_settings_from(None, env(&[])).unwrap();
        assert_eq!(settings, ResqConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let settings = load_settings_from(
            None,
            env(&[
                ("RESQ_MAX_WORKERS", "8"),
                ("RESQ_QUEUES", "critical,default"),
                ("RESQ_STORE_URL", "redis://127.0.0.1:6379/0"),
                ("RESQ_JOB_TIMEOUT_SECS", "30"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.queues, vec!["critical", "default"]);
        assert_eq!(settings.store_url, "redis://127.0.0.1:6379/0");
        assert_eq!(settings.job_timeout_secs, Some(30));
    }

    #[test]
    fn test_file_then_environment() {
        let dir = std::env::temp_dir().join(format!("resq-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("resq.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_workers = 2").unwrap();
        writeln!(file, "queues = [\"TestJob\", \"TestItem\"]").unwrap();
        writeln!(file, "blpop_max_block_time_secs = 3").unwrap();

        let settings =
            load_settings_from(Some(&path), env(&[("RESQ_MAX_WORKERS", "6")])).unwrap();

        assert_eq!(settings.max_workers, 6);
        assert_eq!(settings.queues, vec!["TestJob", "TestItem"]);
        assert_eq!(settings.blpop_max_block_time_secs, 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = load_settings_from(None, env(&[("RESQ_MAX_WORKERS", "0")]));
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_settings_from(Some(Path::new("/nonexistent/resq.toml")), env(&[]));
        assert!(result.is_err());
    }
}
