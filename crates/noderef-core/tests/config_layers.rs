//! Config layering: defaults, `noderef.json`, then environment.

use noderef_core::config::{
    InstallSource, RefreshConfig, COMMUNITY_URL_ENV, DEFAULT_COMMUNITY_URL, OFFICIAL_URL_ENV,
    OUT_DIR_ENV,
};
use serial_test::serial;
use std::fs;

fn clear_env() {
    for key in [OFFICIAL_URL_ENV, COMMUNITY_URL_ENV, OUT_DIR_ENV] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_file_then_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    fs::write(
        dir.path().join("noderef.json"),
        r#"{ "officialUrl": "http://file.example/api/nodes", "packagesDir": "vendor/node_modules", "dynamic": false }"#,
    )
    .unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    std::env::set_var(OFFICIAL_URL_ENV, "http://env.example/api/nodes");
    std::env::set_var(OUT_DIR_ENV, "/tmp/noderef-cache");
    let config = RefreshConfig::load(&nested);
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.official_url, "http://env.example/api/nodes");
    assert_eq!(config.community_url, DEFAULT_COMMUNITY_URL);
    assert_eq!(config.out_dir, std::path::PathBuf::from("/tmp/noderef-cache"));
    assert_eq!(
        config.install,
        InstallSource::Existing(dir.path().join("vendor/node_modules"))
    );
    assert!(!config.dynamic);
}

#[test]
#[serial]
fn test_unknown_config_key_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("noderef.json"), r#"{ "pageSize": 10, "colour": "red" }"#).unwrap();

    let err = RefreshConfig::load(dir.path()).unwrap_err();
    assert!(err.to_string().contains("noderef.json"));
}
