use crate::cli::Cli;
use crate::detect::{DetectionRule, DetectionRuleConfig};
use crate::error::PropertiesError;
use crate::transform::TransformerCommand;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

pub type Result<T> = std::result::Result<T, PropertiesError>;

pub const ENV_DATA_DIR: &str = "RULE_VALIDATOR_DATA_DIR";
pub const ENV_SUPPRESS_WARNINGS: &str = "RULE_VALIDATOR_SUPPRESS_WARNINGS";
pub const ENV_LOG_STATISTICS: &str = "RULE_VALIDATOR_LOG_STATISTICS";
pub const ENV_XSLT_PROGRAM: &str = "RULE_VALIDATOR_XSLT_PROGRAM";

/// Validator settings shared by every run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorProperties {
    /// Root of the STANDARD and CUSTOM configuration trees
    pub data_dir: PathBuf,
    /// Default for warning suppression; a request can only turn it on
    pub suppress_warnings: bool,
    /// Record statistics for every completed run
    pub log_statistics: bool,
    /// Where statistics files go; `<data_dir>/LOG` when unset
    pub statistics_dir: Option<PathBuf>,
    /// XSLT processor used for rule and filter steps
    pub transformer: TransformerCommand,
    /// Autodetection rules tried before the built-in ones
    pub detection: Vec<DetectionRuleConfig>,
}

impl Default for ValidatorProperties {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rule-validator"),
            suppress_warnings: false,
            log_statistics: false,
            statistics_dir: None,
            transformer: TransformerCommand::default(),
            detection: Vec::new(),
        }
    }
}

impl ValidatorProperties {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn statistics_directory(&self) -> PathBuf {
        self.statistics_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("LOG"))
    }
}

/// Loads properties with precedence: file -> environment -> CLI
pub struct PropertiesLoader;

impl PropertiesLoader {
    pub async fn load_properties(cli: &Cli) -> Result<ValidatorProperties> {
        let mut properties = match &cli.properties {
            Some(path) => Self::load_from_file(path).await?,
            None => Self::find_properties_file().await?.unwrap_or_default(),
        };

        properties = Self::apply_environment_overrides(properties)?;
        properties = Self::merge_with_cli(properties, cli);

        Self::validate_properties(&properties)?;

        Ok(properties)
    }

    /// Load properties from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<ValidatorProperties> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(PropertiesError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(properties) = toml::from_str::<ValidatorProperties>(&content) {
                    Ok(properties)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a properties file in the working directory, then the user config directory
    pub async fn find_properties_file() -> Result<Option<ValidatorProperties>> {
        let names = [
            "rule-validator.toml",
            "rule-validator.json",
            ".rule-validator.toml",
            ".rule-validator.json",
        ];

        for name in &names {
            let path = PathBuf::from(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("rule-validator");
            for name in &names {
                let path = app_dir.join(name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    pub fn apply_environment_overrides(
        properties: ValidatorProperties,
    ) -> Result<ValidatorProperties> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, properties)
    }

    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut properties: ValidatorProperties,
    ) -> Result<ValidatorProperties> {
        if let Some(data_dir) = env.get(ENV_DATA_DIR) {
            properties.data_dir = PathBuf::from(data_dir);
        }

        if let Some(suppress) = env.get(ENV_SUPPRESS_WARNINGS) {
            properties.suppress_warnings = suppress.parse().map_err(|_| {
                PropertiesError::Environment(format!(
                    "Invalid {} value: {}",
                    ENV_SUPPRESS_WARNINGS, suppress
                ))
            })?;
        }

        if let Some(log_statistics) = env.get(ENV_LOG_STATISTICS) {
            properties.log_statistics = log_statistics.parse().map_err(|_| {
                PropertiesError::Environment(format!(
                    "Invalid {} value: {}",
                    ENV_LOG_STATISTICS, log_statistics
                ))
            })?;
        }

        if let Some(program) = env.get(ENV_XSLT_PROGRAM) {
            properties.transformer.program = program;
        }

        Ok(properties)
    }

    /// CLI arguments take precedence over everything else
    pub fn merge_with_cli(mut properties: ValidatorProperties, cli: &Cli) -> ValidatorProperties {
        if let Some(data_dir) = &cli.data_dir {
            properties.data_dir = data_dir.clone();
        }
        properties.suppress_warnings |= cli.suppress_warnings;
        properties
    }

    pub fn validate_properties(properties: &ValidatorProperties) -> Result<()> {
        if properties.transformer.program.trim().is_empty() {
            return Err(PropertiesError::Validation(
                "Transformer program must not be empty".to_string(),
            ));
        }

        if properties.data_dir.as_os_str().is_empty() {
            return Err(PropertiesError::Validation(
                "Data directory must not be empty".to_string(),
            ));
        }

        for rule in &properties.detection {
            if rule.schema.trim().is_empty() {
                return Err(PropertiesError::Validation(
                    "Detection rule without schema identifier".to_string(),
                ));
            }
            DetectionRule::try_from(rule).map_err(|e| {
                PropertiesError::Validation(format!(
                    "Invalid detection pattern for '{}': {}",
                    rule.schema, e
                ))
            })?;
        }

        Ok(())
    }
}
