//! Configuration Loader
//!
//! Environment-aware loading of [`PipelineConfig`]: a base file, an optional
//! environment overlay next to it (`pullpush.production.yaml` beside
//! `pullpush.yaml`), then `PULLPUSH__*` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::PipelineConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix for environment variable overrides (`PULLPUSH__PULL_BATCH_SIZE=64`)
pub const ENV_PREFIX: &str = "PULLPUSH";

/// Loaded and validated pipeline configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from environment variables only
    pub fn load() -> ConfigResult<Self> {
        Self::load_from_sources(None, &Self::detect_environment(), Some(ENV_PREFIX))
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_from_sources(
            Some(path.as_ref()),
            &Self::detect_environment(),
            Some(ENV_PREFIX),
        )
    }

    /// Load configuration with an explicit environment and variable prefix
    ///
    /// Tests use a unique prefix so they never race on shared process variables.
    pub fn load_from_sources(
        path: Option<&Path>,
        environment: &str,
        env_prefix: Option<&str>,
    ) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!(
                "CONFIG: Loading pipeline configuration for '{}' from {}",
                environment,
                path.display()
            );
            builder = builder.add_source(File::from(path).required(true));

            if let Some(overlay) = Self::environment_overlay(path, environment) {
                if overlay.is_file() {
                    debug!("CONFIG: Applying environment overlay {}", overlay.display());
                    builder = builder.add_source(File::from(overlay).required(false));
                }
            }
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: PipelineConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::load_failed(source_name.clone(), e))?;

        config.validate()?;

        info!(
            environment = %environment,
            source = %source_name,
            pull_batch_size = config.pull_batch_size,
            update_workers = config.update_workers,
            push_workers = config.push_workers,
            "CONFIG: Pipeline configuration loaded"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            source: path.map(Path::to_path_buf),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn into_config(self) -> PipelineConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("PULLPUSH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn environment_overlay(path: &Path, environment: &str) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let file_name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{environment}.{ext}"),
            None => format!("{stem}.{environment}"),
        };
        Some(path.with_file_name(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "pullpush.yaml",
            "pull_batch_size: 10\npush_workers: 3\nselect_fields:\n  - title\nsizing:\n  max_chunk_size: 50\n",
        );

        let manager = ConfigManager::load_from_sources(Some(&path), "test", None).unwrap();
        let config = manager.config();

        assert_eq!(config.pull_batch_size, 10);
        assert_eq!(config.push_workers, 3);
        assert_eq!(config.select_fields, vec!["title".to_string()]);
        assert_eq!(config.sizing.max_chunk_size, 50);
        // untouched values fall back to defaults
        assert_eq!(config.update_batch_size, 128);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "pullpush.yaml", "update_workers: 2\n");
        write_file(dir.path(), "pullpush.production.yaml", "update_workers: 8\n");

        let dev = ConfigManager::load_from_sources(Some(&path), "development", None).unwrap();
        let prod = ConfigManager::load_from_sources(Some(&path), "production", None).unwrap();

        assert_eq!(dev.config().update_workers, 2);
        assert_eq!(prod.config().update_workers, 8);
    }

    #[test]
    fn test_env_prefix_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "pullpush.yaml", "pull_batch_size: 10\n");

        std::env::set_var("PPLOADERTEST__PULL_BATCH_SIZE", "42");
        let manager =
            ConfigManager::load_from_sources(Some(&path), "test", Some("PPLOADERTEST")).unwrap();
        std::env::remove_var("PPLOADERTEST__PULL_BATCH_SIZE");

        assert_eq!(manager.config().pull_batch_size, 42);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "pullpush.yaml", "ram_ratio: 2.0\n");

        let result = ConfigManager::load_from_sources(Some(&path), "test", None);
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "ram_ratio"
        ));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let result = ConfigManager::load_from_sources(Some(&path), "test", None);
        assert!(matches!(result, Err(ConfigurationError::LoadFailed { .. })));
    }
}
