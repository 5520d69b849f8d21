// tests/notifier_config.rs
use airing_notifier::config::{NotifierConfig, ENV_CONFIG_PATH};
use std::path::PathBuf;
use std::{env, fs};

const SAMPLE: &str = r#"
max_concurrent_dispatches = 8

[catalog]
base_url = "http://127.0.0.1:9000/3"
api_key = "ENV"
language = "en-GB"

[email]
smtp_host = "smtp.example.com"
smtp_user = "mailer"
smtp_pass = "ENV"
from_address = "noreply@example.com"

[storage]
ledger_path = "state/ledger.json"
subscribers_path = "data/users.json"

[schedule]
interval_secs = 3600
run_on_start = true
"#;

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        "THE_MOVIE_DB_TOKEN",
        "SMTP_PASS",
        "FROM_EMAIL_ADDRESS",
    ] {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn env_markers_resolve_from_environment() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("notifier.toml");
    fs::write(&p, SAMPLE).unwrap();

    env::set_var("THE_MOVIE_DB_TOKEN", "tmdb-token");
    env::set_var("SMTP_PASS", "hunter2");
    let cfg = NotifierConfig::load_from(&p).unwrap();

    assert_eq!(cfg.catalog.api_key, "tmdb-token");
    assert_eq!(cfg.catalog.language, "en-GB");
    assert_eq!(cfg.email.smtp_pass.as_deref(), Some("hunter2"));
    assert_eq!(cfg.email.from_address.as_deref(), Some("noreply@example.com"));
    assert_eq!(cfg.max_concurrent_dispatches, 8);
    assert_eq!(cfg.schedule.interval_secs, 3600);
    assert!(cfg.schedule.run_on_start);
    assert_eq!(cfg.storage.subscribers_path, PathBuf::from("data/users.json"));
    clear_env();
}

#[serial_test::serial]
#[test]
fn missing_catalog_token_is_a_load_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("notifier.toml");
    fs::write(&p, "[catalog]\napi_key = \"ENV\"\n").unwrap();

    let err = NotifierConfig::load_from(&p).unwrap_err();

    assert!(format!("{err:#}").contains("THE_MOVIE_DB_TOKEN"));
}

#[serial_test::serial]
#[test]
fn from_address_env_overrides_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("notifier.toml");
    fs::write(
        &p,
        "[catalog]\napi_key = \"literal\"\n[email]\nfrom_address = \"file@example.com\"\n",
    )
    .unwrap();

    env::set_var("FROM_EMAIL_ADDRESS", "env@example.com");
    let cfg = NotifierConfig::load_from(&p).unwrap();

    assert_eq!(cfg.catalog.api_key, "literal");
    assert_eq!(cfg.email.from_address.as_deref(), Some("env@example.com"));
    clear_env();
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    clear_env();
    // Isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::set_var("THE_MOVIE_DB_TOKEN", "t");

    // 1) Nothing on disk → defaults
    let v = NotifierConfig::load_default().unwrap();
    assert_eq!(v.schedule.interval_secs, 86_400);

    // 2) Fallback config/notifier.toml
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/notifier.toml"),
        "[schedule]\ninterval_secs = 60\n",
    )
    .unwrap();
    assert_eq!(NotifierConfig::load_default().unwrap().schedule.interval_secs, 60);

    // 3) Env path wins
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "[schedule]\ninterval_secs = 120\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(NotifierConfig::load_default().unwrap().schedule.interval_secs, 120);

    // 4) Env path pointing nowhere is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(NotifierConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}
