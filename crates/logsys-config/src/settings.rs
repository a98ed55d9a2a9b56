//! Layered settings for recruiting new generations.
//!
//! Precedence, lowest to highest:
//! 1. Built-in defaults
//! 2. Settings file (TOML), if configured and present
//! 3. Environment variables (`LOGSYS_RECRUITMENT__REPLICATION_FACTOR=5`)

use std::path::{Path, PathBuf};

use logsys_types::{LocalityTag, LogSystemKind, PolicyMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "LOGSYS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings consulted when a new generation is recruited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recruitment: RecruitmentSettings,
    pub log_system: LogSystemSettings,
}

/// Replication parameters applied to newly recruited groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecruitmentSettings {
    /// Servers allowed to miss a write.
    pub write_anti_quorum: u32,
    pub replication_factor: u32,
    pub locality: LocalityTag,
    /// Whether new groups live in the primary region.
    pub is_local: bool,
    pub policy_mode: PolicyMode,
}

impl Default for RecruitmentSettings {
    fn default() -> Self {
        Self {
            write_anti_quorum: 0,
            replication_factor: 3,
            locality: LocalityTag::INVALID,
            is_local: true,
            policy_mode: PolicyMode::ById,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSystemSettings {
    pub kind: LogSystemKind,
    /// Minimum log routers per remote group.
    pub min_routers: u32,
    pub expected_group_count: u32,
}

impl Default for LogSystemSettings {
    fn default() -> Self {
        Self {
            kind: LogSystemKind::TagPartitioned,
            min_routers: 0,
            expected_group_count: 1,
        }
    }
}

impl Settings {
    /// Writes these settings to `path` as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Loads [`Settings`] from defaults, an optional file and the environment.
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    env_source: Option<config::Map<String, String>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_source: None,
        }
    }

    /// Reads the given TOML file after the defaults. A missing file is
    /// skipped.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix (default: `LOGSYS`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Reads environment variables from `vars` instead of the process
    /// environment.
    pub fn with_env_source(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn load(self) -> Result<Settings, SettingsError> {
        let mut builder = config::Config::builder();

        let defaults = Settings::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        if let Some(file) = &self.file {
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        tracing::debug!(
            replication_factor = settings.recruitment.replication_factor,
            write_anti_quorum = settings.recruitment.write_anti_quorum,
            kind = ?settings.log_system.kind,
            "loaded log system settings"
        );
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn env(vars: &[(&str, &str)]) -> config::Map<String, String> {
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_load_defaults() {
        let settings = SettingsLoader::new()
            .with_env_source(env(&[]))
            .load()
            .expect("Failed to load settings");

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.recruitment.replication_factor, 3);
        assert_eq!(settings.log_system.kind, LogSystemKind::TagPartitioned);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let settings = SettingsLoader::new()
            .with_file(temp_dir.path().join("absent.toml"))
            .with_env_source(env(&[]))
            .load()
            .expect("Failed to load settings");

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("logsys.toml");
        fs::write(
            &path,
            r#"
[recruitment]
replication_factor = 5
locality = 1
policy_mode = "none"

[log_system]
min_routers = 2
"#,
        )
        .expect("Failed to write settings");

        let settings = SettingsLoader::new()
            .with_file(&path)
            .with_env_source(env(&[]))
            .load()
            .expect("Failed to load settings");

        assert_eq!(settings.recruitment.replication_factor, 5);
        assert_eq!(settings.recruitment.locality, LocalityTag::new(1));
        assert_eq!(settings.recruitment.policy_mode, PolicyMode::None);
        assert_eq!(settings.log_system.min_routers, 2);
        // Untouched keys keep their defaults.
        assert!(settings.recruitment.is_local);
        assert_eq!(settings.log_system.expected_group_count, 1);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("logsys.toml");
        fs::write(&path, "[recruitment]\nreplication_factor = 5\n").expect("Failed to write settings");

        let settings = SettingsLoader::new()
            .with_file(&path)
            .with_env_source(env(&[
                ("LOGSYS_RECRUITMENT__REPLICATION_FACTOR", "7"),
                ("LOGSYS_RECRUITMENT__IS_LOCAL", "false"),
            ]))
            .load()
            .expect("Failed to load settings");

        assert_eq!(settings.recruitment.replication_factor, 7);
        assert!(!settings.recruitment.is_local);
    }

    #[test]
    fn test_custom_env_prefix() {
        let settings = SettingsLoader::new()
            .with_env_prefix("TLOG")
            .with_env_source(env(&[
                ("TLOG_LOG_SYSTEM__MIN_ROUTERS", "4"),
                ("LOGSYS_LOG_SYSTEM__MIN_ROUTERS", "9"),
            ]))
            .load()
            .expect("Failed to load settings");

        assert_eq!(settings.log_system.min_routers, 4);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("saved.toml");

        let mut settings = Settings::default();
        settings.recruitment.write_anti_quorum = 1;
        settings.log_system.kind = LogSystemKind::Empty;
        settings.save(&path).expect("Failed to save settings");

        let loaded = SettingsLoader::new()
            .with_file(&path)
            .with_env_source(env(&[]))
            .load()
            .expect("Failed to load settings");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("missing").join("saved.toml");

        let err = Settings::default().save(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Write { .. }));
    }
}
