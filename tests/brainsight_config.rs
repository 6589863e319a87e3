use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use brainsight::config::BrainsightConfig;
use brainsight::detect::{AuthScheme, RequestFormat};
use brainsight::FacingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BRAINSIGHT_CONFIG",
        "BRAINSIGHT_BACKEND_URL",
        "BRAINSIGHT_MODEL",
        "BRAINSIGHT_TIMEOUT_SECS",
        "BRAINSIGHT_CAMERA_DEVICE",
        "BRAINSIGHT_RELAY_ADDR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend": {
            "url": "https://relay.example.com/functions/v1/detect-objects",
            "format": "relay",
            "auth": "bearer",
            "api_key_env": "RELAY_ANON_KEY",
            "timeout_secs": 20
        },
        "camera": {
            "device": "stub://rear",
            "front_device": "stub://front",
            "facing": "user",
            "width": 1280,
            "height": 720,
            "jpeg_quality": 90
        },
        "relay": { "addr": "0.0.0.0:9100" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("BRAINSIGHT_CONFIG", file.path());
    std::env::set_var("BRAINSIGHT_MODEL", "vision-small");
    std::env::set_var("BRAINSIGHT_RELAY_ADDR", "127.0.0.1:9200");

    let cfg = BrainsightConfig::load().expect("load config");

    assert_eq!(
        cfg.backend.url,
        "https://relay.example.com/functions/v1/detect-objects"
    );
    assert_eq!(cfg.backend.format, RequestFormat::Relay);
    assert_eq!(cfg.backend.auth, AuthScheme::Bearer);
    assert_eq!(cfg.backend.api_key_env, "RELAY_ANON_KEY");
    assert_eq!(cfg.backend.model, "vision-small");
    assert_eq!(cfg.backend.max_tokens, 1024);
    assert_eq!(cfg.backend.timeout, Some(Duration::from_secs(20)));
    assert_eq!(cfg.camera.device, "stub://rear");
    assert_eq!(cfg.camera.front_device.as_deref(), Some("stub://front"));
    assert_eq!(cfg.camera.facing, FacingMode::User);
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.jpeg_quality, 90);
    assert_eq!(cfg.relay.addr, "127.0.0.1:9200");

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[backend]
model = "claude-test"
max_tokens = 512

[camera]
device = "stub://desk?warmup=2"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("BRAINSIGHT_CONFIG", file.path());
    std::env::set_var("BRAINSIGHT_CAMERA_DEVICE", "stub://override");

    let cfg = BrainsightConfig::load().expect("load config");
    assert_eq!(cfg.backend.model, "claude-test");
    assert_eq!(cfg.backend.max_tokens, 512);
    assert_eq!(cfg.backend.url, "https://api.anthropic.com/v1/messages");
    assert_eq!(cfg.backend.format, RequestFormat::Messages);
    assert_eq!(cfg.camera.device, "stub://override");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = BrainsightConfig::load().expect("load defaults");
    assert_eq!(cfg.backend.api_key_env, "ANTHROPIC_API_KEY");
    assert_eq!(cfg.backend.timeout, None);
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!(cfg.relay.addr, "127.0.0.1:8787");
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BRAINSIGHT_TIMEOUT_SECS", "soon");
    assert!(BrainsightConfig::load().is_err());
    std::env::set_var("BRAINSIGHT_TIMEOUT_SECS", "0");
    assert!(BrainsightConfig::load().is_err());
    clear_env();

    std::env::set_var("BRAINSIGHT_BACKEND_URL", "not a url");
    assert!(BrainsightConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"camera": {"jpeg_quality": 150}}"#)
        .expect("write config");
    std::env::set_var("BRAINSIGHT_CONFIG", file.path());
    assert!(BrainsightConfig::load().is_err());

    std::env::set_var("BRAINSIGHT_CONFIG", "/nonexistent/brainsight.json");
    assert!(BrainsightConfig::load().is_err());

    clear_env();
}
