use formpilot_config::{CapabilityConfig, FormpilotConfigLoader};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

#[test]
#[serial]
fn test_config_load() {
    let tmp = TempDir::new().unwrap();

    let file_yaml = r#"
version: "0.1"
browser:
  webdriver_url: "http://localhost:9515"
  headless: true
  pool_size: 4
  acquire_timeout_secs: 10
detection:
  settle_wait_ms: 500
  visual_baseline: 0.6
mapping:
  acceptance_threshold: 0.65
  allow_generated: false
  alias_overrides:
    - pattern: "(?i)matriculation"
      attribute: "education"
capability:
  provider: ollama
  model: "mistral:7b"
  vision_model: "llava:13b"
store:
  database_url: "sqlite://${HOME}/formpilot/artifacts.db"
  artifact_ttl_secs: 7200
  "#;
    let p = write_yaml(&tmp, "formpilot.yaml", file_yaml);

    temp_env::with_var("HOME", Some("/home/applicant"), || {
        let config = FormpilotConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load system config");

        assert_eq!(config.browser.pool_size, 4);
        assert!((config.mapping.acceptance_threshold - 0.65).abs() < f32::EPSILON);
        assert!(!config.mapping.allow_generated);
        assert_eq!(config.mapping.alias_overrides.len(), 1);
        assert_eq!(
            config.store.database_url,
            "sqlite:///home/applicant/formpilot/artifacts.db"
        );
        assert_eq!(config.store.artifact_ttl_secs, 7200);
        match config.capability {
            CapabilityConfig::Ollama {
                model,
                vision_model,
                endpoint,
                call_timeout_secs,
            } => {
                assert_eq!(model, "mistral:7b");
                assert_eq!(vision_model, "llava:13b");
                assert_eq!(endpoint, "http://localhost:11434");
                assert_eq!(call_timeout_secs, 120);
            }
            CapabilityConfig::None => panic!("expected ollama capability"),
        }
    });
}

#[test]
#[serial]
fn missing_optional_file_falls_back_to_defaults() {
    let config = FormpilotConfigLoader::new()
        .with_optional_file("/definitely/not/here/formpilot.yaml")
        .load()
        .expect("defaults without a file");
    assert!(matches!(config.capability, CapabilityConfig::None));
    assert_eq!(config.retries.driver_attempts, 2);
}
