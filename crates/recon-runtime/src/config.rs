//! Multi-format configuration loading for [`crate::agent::AgentOptions`]
//! (§10.3): format auto-detected from the file extension, with `${VAR}` /
//! `$VAR` environment-variable substitution applied before deserialization.

use config::{Config as Cfg, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or parsing an options file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// The serializable subset of an agent's tuning options — everything except
/// `sensors` (trait objects) and `follow`'s companion wiring, which are
/// supplied programmatically when the agent is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOptionsFile {
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub follow: bool,
}

fn default_min_wait_ms() -> u64 {
    0
}
fn default_max_retries() -> usize {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for AgentOptionsFile {
    fn default() -> Self {
        Self {
            min_wait_ms: default_min_wait_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            follow: false,
        }
    }
}

/// Detects the configuration format from a file's extension.
///
/// Supported extensions: `.yaml`/`.yml`, `.toml`, `.json`.
pub fn detect_format(path: &str) -> Result<FileFormat, ConfigError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitutes `${VAR_NAME}` and `$VAR_NAME` references with the named
/// environment variable's value, leaving unset variables untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let re_braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let substituted = re_braced.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    let re_simple = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
    re_simple
        .replace_all(&substituted, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

/// Loads and deserializes a config file, auto-detecting its format and
/// substituting environment variables first.
pub fn load_file<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let format = detect_format(&path.to_string_lossy())?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    let built = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    built.try_deserialize().map_err(|e| ConfigError::Parse(e.to_string()))
}

impl AgentOptionsFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(detect_format("a.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("a.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("a.json").unwrap(), FileFormat::Json);
        assert!(detect_format("a.ini").is_err());
        assert!(detect_format("noext").is_err());
    }

    #[test]
    fn substitutes_braced_and_bare_vars() {
        unsafe { std::env::set_var("RECON_TEST_VAR", "value123") };
        assert_eq!(substitute_env_vars("x: ${RECON_TEST_VAR}"), "x: value123");
        assert_eq!(substitute_env_vars("x: $RECON_TEST_VAR"), "x: value123");
        assert_eq!(substitute_env_vars("x: ${RECON_TEST_UNSET_VAR}"), "x: ${RECON_TEST_UNSET_VAR}");
    }

    #[test]
    fn loads_yaml_file_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "max_retries: 7").unwrap();
        let opts = AgentOptionsFile::from_file(file.path()).unwrap();
        assert_eq!(opts.max_retries, 7);
        assert_eq!(opts.min_wait_ms, default_min_wait_ms());
    }

    #[test]
    fn loads_toml_file_with_env_substitution() {
        unsafe { std::env::set_var("RECON_BACKOFF_BASE_MS", "500") };
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "backoff_base_ms = ${{RECON_BACKOFF_BASE_MS}}").unwrap();
        let opts = AgentOptionsFile::from_file(file.path()).unwrap();
        assert_eq!(opts.backoff_base_ms, 500);
    }
}
