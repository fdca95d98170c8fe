//! Loader for workspace configuration with YAML + environment overlays.
//!
//! `formpilot.yaml` holds every tunable the pipeline exposes: detection and
//! mapping thresholds, retry bounds, capability endpoints, browser pool
//! sizing, and artifact TTLs. `FORMPILOT__`-prefixed environment variables
//! override file values, and `${VAR}` placeholders inside values are
//! expanded recursively before typed deserialization.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct FormpilotConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    #[serde(default)]
    pub capability: CapabilityConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Browser context pool and stealth settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: String,
    /// Number of concurrent browser contexts; also the worker pool size.
    pub pool_size: usize,
    /// How long a worker waits for a context before the run is requeued.
    pub acquire_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            stealth: "balanced".into(),
            pool_size: 2,
            acquire_timeout_secs: 30,
        }
    }
}

/// Form detection tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Wait applied before the single re-detection pass on an empty page.
    pub settle_wait_ms: u64,
    /// Upper bound on confidence for visual-origin descriptors.
    pub visual_baseline: f32,
    /// Below this many DOM fields the visual strategy is consulted.
    pub min_dom_fields: usize,
    /// Share of DOM fields allowed to have unknown semantics before the
    /// visual strategy is consulted anyway.
    pub max_unknown_ratio: f32,
    /// Maximum focus stops for the tab-order walk.
    pub tab_walk_limit: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            settle_wait_ms: 1500,
            visual_baseline: 0.55,
            min_dom_fields: 3,
            max_unknown_ratio: 0.5,
            tab_walk_limit: 50,
        }
    }
}

/// Field mapping tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Mappings below this confidence are never auto-filled.
    pub acceptance_threshold: f32,
    /// Whether page-required free-text fields may fall back to generated
    /// content instead of aborting the run.
    pub allow_generated: bool,
    /// Extra label-pattern → attribute rules merged into the alias table.
    pub alias_overrides: Vec<AliasOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasOverride {
    pub pattern: String,
    pub attribute: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            allow_generated: true,
            alias_overrides: Vec::new(),
        }
    }
}

/// Bounded-retry settings, per spec'd granularity: field-level retries are
/// distinct from state-machine-level driver retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per field on a stale locator before the field is skipped.
    pub field_attempts: u32,
    /// Re-detections allowed while retrying a single field.
    pub redetect_limit: u32,
    /// Navigation/driver attempts before the run fails.
    pub driver_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            field_attempts: 3,
            redetect_limit: 2,
            driver_attempts: 2,
        }
    }
}

/// The external visual/LLM capability. `provider: none` degrades the
/// pipeline to DOM-only detection and alias-only mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum CapabilityConfig {
    Ollama {
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        model: String,
        vision_model: String,
        #[serde(default = "default_capability_timeout")]
        call_timeout_secs: u64,
    },
    None,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        CapabilityConfig::None
    }
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}

fn default_capability_timeout() -> u64 {
    120
}

/// TTL artifact store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    /// Lifetime of run artifacts (schema snapshots, screenshots, logs).
    pub artifact_ttl_secs: i64,
    /// Interval of the expired-row sweep.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://formpilot.db".into(),
            artifact_ttl_secs: 24 * 3600,
            sweep_interval_secs: 3600,
        }
    }
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

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct FormpilotConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for FormpilotConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FormpilotConfigLoader {
    /// Start with sensible defaults: YAML file + `FORMPILOT_` env overrides.
    ///
    /// ```
    /// use formpilot_config::FormpilotConfigLoader;
    ///
    /// let config = FormpilotConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.retries.field_attempts, 3);
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("FORMPILOT").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self.builder.add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so headless deployments can rely
    /// purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self.builder.add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use formpilot_config::{CapabilityConfig, FormpilotConfigLoader};
    ///
    /// let cfg = FormpilotConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "test"
    /// capability:
    ///   provider: "ollama"
    ///   model: "mistral:7b"
    ///   vision_model: "llava:13b"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(matches!(cfg.capability, CapabilityConfig::Ollama { .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// The loader combines YAML snippets with `FORMPILOT_`-prefixed environment
    /// variables and expands `${VAR}` placeholders before materialising
    /// strongly typed structs.
    pub fn load(self) -> Result<FormpilotConfig, ConfigError> {
        let cfg = self.builder.build()?;

        // Convert to serde_json::Value first so env expansion sees every leaf
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: FormpilotConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
