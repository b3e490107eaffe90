//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Everything the scraper, CAPTCHA solver, and stores need at runtime is
//! gathered here as explicit typed configuration, handed into constructors
//! by the binary. Values come from an optional `dredge.yaml`, overlaid with
//! `DREDGE_`-prefixed environment variables, with `${VAR}` placeholders
//! expanded recursively (depth-capped).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DredgeConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// WebDriver connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Endpoint of a running WebDriver service (chromedriver/geckodriver).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
        }
    }
}

/// CAPTCHA detection and solving settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Solving-service API key. Absent ⇒ widget CAPTCHAs cannot be solved
    /// and image CAPTCHAs have no remote fallback.
    #[serde(default)]
    pub service_api_key: Option<String>,
    /// Base URL of the solving service.
    #[serde(default = "default_service_base_url")]
    pub service_base_url: String,
    /// Directory for diagnostic element screenshots.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Run a detect-and-solve pass after navigations and clicks.
    #[serde(default = "default_true")]
    pub auto_solve: bool,
    /// Per-pattern detection wait bound, in seconds.
    #[serde(default = "default_detect_timeout_secs")]
    pub detect_timeout_secs: u64,
    /// Interval between solving-service polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause before the post-action detection pass, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after a successful solve, letting the page reload, in ms.
    #[serde(default = "default_post_solve_delay_ms")]
    pub post_solve_delay_ms: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            service_api_key: None,
            service_base_url: default_service_base_url(),
            temp_dir: default_temp_dir(),
            auto_solve: true,
            detect_timeout_secs: default_detect_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            post_solve_delay_ms: default_post_solve_delay_ms(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Export target directories.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_api_export_dir")]
    pub api_directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_dir(),
            api_directory: default_api_export_dir(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_service_base_url() -> String {
    "https://2captcha.com".into()
}
fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp_captcha")
}
fn default_database_path() -> PathBuf {
    PathBuf::from("database/dredge.db")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("exported_data")
}
fn default_api_export_dir() -> PathBuf {
    PathBuf::from("exported_api")
}
fn default_true() -> bool {
    true
}
fn default_detect_timeout_secs() -> u64 {
    5
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_settle_delay_ms() -> u64 {
    1_000
}
fn default_post_solve_delay_ms() -> u64 {
    3_000
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct DredgeConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for DredgeConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DredgeConfigLoader {
    /// Start with the defaults: `DREDGE_` env overrides only. Attach a file
    /// with [`with_file`](Self::with_file) if one exists.
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("DREDGE").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by
    /// suffix. Missing files are tolerated so headless deployments can rely
    /// purely on environment variables.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet (tests, CLI overrides).
    ///
    /// ```
    /// use dredge_config::DredgeConfigLoader;
    ///
    /// let cfg = DredgeConfigLoader::new()
    ///     .with_yaml_str("captcha:\n  auto_solve: false")
    ///     .load()
    ///     .expect("valid config");
    /// assert!(!cfg.captcha.auto_solve);
    /// assert_eq!(cfg.captcha.poll_interval_ms, 2000);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    // FIXME: the env overlay delivers every value as a string; coerce
    // booleans/integers before deserializing so DREDGE_CAPTCHA__AUTO_SOLVE=false
    // works without a YAML file.
    pub fn load(self) -> Result<DredgeConfig, ConfigError> {
        let cfg = self.builder.build()?;

        // Through serde_json::Value first so ${VAR} placeholders can be
        // expanded before the typed structs are materialised.
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: DredgeConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_nested_objects() {
        temp_env::with_var("CAPTCHA_KEY", Some("k-123"), || {
            let mut v = json!({ "captcha": { "service_api_key": "${CAPTCHA_KEY}" } });
            expand_env_in_value(&mut v);
            assert_eq!(v["captcha"]["service_api_key"], json!("k-123"));
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            // Only termination matters here; the cycle leaves an
            // unresolved placeholder behind.
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn defaults_cover_every_section() {
        let cfg = DredgeConfigLoader::new().load().expect("empty config loads");
        assert!(cfg.captcha.auto_solve);
        assert!(cfg.captcha.service_api_key.is_none());
        assert_eq!(cfg.captcha.detect_timeout_secs, 5);
        assert_eq!(cfg.browser.webdriver_url, "http://localhost:9515");
        assert_eq!(cfg.export.directory, PathBuf::from("exported_data"));
    }
}
