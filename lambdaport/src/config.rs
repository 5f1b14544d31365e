//! Configuration management

use lambdaport_iam::BASELINE_EXECUTION_POLICY_ARN;
use lambdaport_lambda::WaitConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default folder for manifests and packages
pub const DEFAULT_FOLDER: &str = "exports/lambdas";

/// Runtime settings, read from `lambdaport.toml` and `LAMBDAPORT_*`
/// environment variables, then overridden by command-line flags
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub export_folder: PathBuf,
    pub import_folder: PathBuf,
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Destination account id. Discovered through STS when unset.
    pub destination_account: Option<String>,
    pub poll_interval_secs: u64,
    pub settle_timeout_secs: u64,
    pub role_propagation_delay_secs: u64,
    pub baseline_policy_arn: String,
    pub capture_roles: bool,
    pub download_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            export_folder: PathBuf::from(DEFAULT_FOLDER),
            import_folder: PathBuf::from(DEFAULT_FOLDER),
            region: None,
            profile: None,
            destination_account: None,
            poll_interval_secs: 2,
            settle_timeout_secs: 60,
            role_propagation_delay_secs: 3,
            baseline_policy_arn: BASELINE_EXECUTION_POLICY_ARN.to_string(),
            capture_roles: true,
            download_timeout_secs: 300,
            log_level: "info".to_string(),
        }
    }
}

/// Values given on the command line, applied over loaded settings
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub export_folder: Option<PathBuf>,
    pub import_folder: Option<PathBuf>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub destination_account: Option<String>,
    pub log_level: Option<String>,
    pub skip_roles: bool,
}

impl Settings {
    /// Load settings from `file` (or an optional `lambdaport.toml` in the
    /// working directory) and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("lambdaport").required(false),
        };

        let config = config::Config::builder()
            .add_source(source)
            .add_source(config::Environment::with_prefix("LAMBDAPORT"))
            .build()?;

        Ok(config.try_deserialize::<Settings>()?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(folder) = overrides.export_folder {
            self.export_folder = folder;
        }
        if let Some(folder) = overrides.import_folder {
            self.import_folder = folder;
        }
        if overrides.region.is_some() {
            self.region = overrides.region;
        }
        if overrides.profile.is_some() {
            self.profile = overrides.profile;
        }
        if overrides.destination_account.is_some() {
            self.destination_account = overrides.destination_account;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if overrides.skip_roles {
            self.capture_roles = false;
        }
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.settle_timeout_secs),
        }
    }

    pub fn role_propagation_delay(&self) -> Duration {
        Duration::from_secs(self.role_propagation_delay_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.export_folder, PathBuf::from("exports/lambdas"));
        assert_eq!(settings.wait_config(), WaitConfig::default());
        assert_eq!(settings.role_propagation_delay(), Duration::from_secs(3));
        assert!(settings.capture_roles);
        assert_eq!(settings.baseline_policy_arn, BASELINE_EXECUTION_POLICY_ARN);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lambdaport.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "import_folder = \"release/lambdas\"\nsettle_timeout_secs = 120\ndestination_account = \"222222222222\""
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.import_folder, PathBuf::from("release/lambdas"));
        assert_eq!(settings.settle_timeout_secs, 120);
        assert_eq!(settings.poll_interval_secs, 2);
        assert_eq!(settings.destination_account.as_deref(), Some("222222222222"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::default();
        settings.apply(Overrides {
            export_folder: Some(PathBuf::from("out")),
            region: Some("eu-west-1".to_string()),
            skip_roles: true,
            ..Overrides::default()
        });

        assert_eq!(settings.export_folder, PathBuf::from("out"));
        assert_eq!(settings.import_folder, PathBuf::from(DEFAULT_FOLDER));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert!(!settings.capture_roles);
    }
}
