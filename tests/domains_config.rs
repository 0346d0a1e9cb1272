// tests/domains_config.rs
use relevance_scraper::config::ServiceConfig;
use relevance_scraper::domains::DomainSets;
use std::{env, fs};

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("domains.toml");
    fs::write(
        &p_toml,
        r#"
trusted = [" news.example ", "", "wire.example"]
social = ["video.example"]
"#,
    )
    .unwrap();
    let d = DomainSets::load_from(&p_toml).unwrap();
    assert!(d.is_trusted("news.example"));
    assert!(d.is_trusted("wire.example"));
    assert_eq!(d.trusted_len(), 2);
    assert!(d.is_social("video.example"));

    let p_json = dir.path().join("domains.json");
    fs::write(&p_json, r#"{"trusted": ["a.example"], "social": [" b.example "]}"#).unwrap();
    let dj = DomainSets::load_from(&p_json).unwrap();
    assert!(dj.is_trusted("a.example"));
    assert!(dj.is_social("b.example"));
}

#[test]
fn overlapping_sets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("domains.toml");
    fs::write(&p, r#"trusted = ["x.example"]
social = ["x.example"]"#)
    .unwrap();
    assert!(DomainSets::load_from(&p).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not read.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var("DOMAINS_CONFIG_PATH");

    // 1) Nothing on disk -> built-in seed
    let d = DomainSets::load_default().unwrap();
    assert_eq!(d, DomainSets::default_seed());

    // 2) ./config/domains.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("domains.toml"), r#"trusted = ["local.example"]"#).unwrap();
    let dt = DomainSets::load_default().unwrap();
    assert!(dt.is_trusted("local.example"));
    assert_eq!(dt.social_len(), 0);

    // 3) env wins
    let p_env = tmp.path().join("domains.json");
    fs::write(&p_env, r#"{"social": ["env.example"]}"#).unwrap();
    env::set_var("DOMAINS_CONFIG_PATH", p_env.display().to_string());
    let de = DomainSets::load_default().unwrap();
    assert!(de.is_social("env.example"));
    assert!(!de.is_trusted("local.example"));

    // 4) env pointing nowhere is an error, not a silent fallback
    env::set_var("DOMAINS_CONFIG_PATH", tmp.path().join("missing.toml").display().to_string());
    assert!(DomainSets::load_default().is_err());
    env::remove_var("DOMAINS_CONFIG_PATH");

    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn service_config_file_then_env() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("scraper.toml");
    fs::write(
        &p,
        r#"
batch_size = 3
max_per_run = 9
language = "en"
"#,
    )
    .unwrap();

    env::set_var("SCRAPER_CONFIG_PATH", p.display().to_string());
    env::set_var("SCRAPER_MAX_PER_RUN", "4");
    let c = ServiceConfig::load();
    env::remove_var("SCRAPER_CONFIG_PATH");
    env::remove_var("SCRAPER_MAX_PER_RUN");

    let c = c.unwrap();
    assert_eq!(c.batch_size, 3);
    assert_eq!(c.max_per_run, 4);
    assert_eq!(c.language, "en");
    assert_eq!(c.collection, "monitor_results");
}

#[test]
fn shipped_config_files_parse() {
    let root = env!("CARGO_MANIFEST_DIR");
    let d = DomainSets::load_from(&std::path::Path::new(root).join("config/domains.toml")).unwrap();
    assert_eq!(d, DomainSets::default_seed());
    let c = ServiceConfig::load_from_file(std::path::Path::new(root).join("config/scraper.toml"))
        .unwrap();
    assert_eq!(c.batch_size, 5);
    assert_eq!(c.relevance_threshold, 0.5);
}
