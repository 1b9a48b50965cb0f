use filestate_core::HMAC_KEY_ENV;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Desired-state manifest (TOML).
    pub manifest: PathBuf,
    /// Persisted state document (JSON).
    pub state: PathBuf,
    /// Log output format.
    pub log_format: LogFormat,
    /// Environment variable holding the HMAC key.
    pub key_env: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("filestate.toml"),
            state: PathBuf::from("filestate.state.json"),
            log_format: LogFormat::Text,
            key_env: HMAC_KEY_ENV.to_string(),
        }
    }
}

impl CliConfig {
    /// Loads a `.toml` or `.json` config file; missing keys take defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: CliConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: CliConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = CliConfig::default();
        assert_eq!(config.manifest, PathBuf::from("filestate.toml"));
        assert_eq!(config.state, PathBuf::from("filestate.state.json"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.key_env, "TF_FILE_HMAC_SECRET_KEY");
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
manifest = "/srv/site.toml"
log_format = "json"
key_env = "SITE_HMAC_KEY"
"#
        )
        .unwrap();

        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.manifest, PathBuf::from("/srv/site.toml"));
        assert_eq!(config.state, PathBuf::from("filestate.state.json"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.key_env, "SITE_HMAC_KEY");
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{"state": "/var/lib/filestate/state.json"}}"#).unwrap();

        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.state, PathBuf::from("/var/lib/filestate/state.json"));
        assert_eq!(config.manifest, PathBuf::from("filestate.toml"));
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let result = CliConfig::from_file(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unsupported config file extension"));
    }

    #[test]
    fn test_from_file_bad_log_format() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"log_format = "xml""#).unwrap();
        assert!(CliConfig::from_file(file.path()).is_err());
    }
}
