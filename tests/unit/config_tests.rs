use super::*;

#[test]
fn defaults_point_at_local_server() {
    let config = AppConfig::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.panel.scroll_idle, Duration::from_secs(3));
    assert_eq!(config.panel.scratch_dir, env::temp_dir());
}

#[test]
fn user_values_override_defaults_key_by_key() {
    let config = AppConfig::from_toml_str(
        r#"
[server]
port = 9123

[panel]
scratch_dir = "/tmp/testgen-scratch"
"#,
    )
    .expect("config");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9123);
    assert_eq!(config.panel.scroll_idle, Duration::from_secs(3));
    assert_eq!(config.panel.scratch_dir, PathBuf::from("/tmp/testgen-scratch"));
}

#[test]
fn rejects_empty_host_and_zero_port() {
    let err = AppConfig::from_toml_str("[server]\nhost = \"  \"\n").expect_err("empty host");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    let err = AppConfig::from_toml_str("[server]\nport = 0\n").expect_err("zero port");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn rejects_invalid_toml() {
    let err = AppConfig::from_toml_str("[server\nport = ").expect_err("broken toml");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn cli_overrides_win_but_ignore_blank_values() {
    let config = AppConfig::default().with_overrides(Some("localhost".to_string()), Some(7000));
    assert_eq!(config.server.host, "localhost");
    assert_eq!(config.server.port, 7000);

    let config = AppConfig::default().with_overrides(Some("   ".to_string()), Some(0));
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn load_reads_an_explicit_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[server]\nhost = \"10.0.0.2\"\n").expect("write config");
    let config = AppConfig::load(Some(&path)).expect("load");
    assert_eq!(config.server.host, "10.0.0.2");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn first_run_writes_the_default_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = ensure_default_config_in(dir.path()).expect("ensure");
    assert_eq!(fs::read_to_string(&path).expect("read"), DEFAULT_CONFIG_TOML);
}

#[test]
fn complete_user_file_is_left_byte_for_byte() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    let text = "# mine\n[server]\nhost = \"h\"\nport = 1\n\n[panel]\nscroll_idle_secs = 9\nscratch_dir = \"\"\n";
    fs::write(&path, text).expect("write config");

    ensure_default_config_in(dir.path()).expect("ensure");

    assert_eq!(fs::read_to_string(&path).expect("read"), text);
}

#[test]
fn partial_user_file_gains_missing_keys_and_keeps_its_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[server]\nport = 9999\n").expect("write config");

    ensure_default_config_in(dir.path()).expect("ensure");

    let merged = fs::read_to_string(&path).expect("read");
    let config = AppConfig::from_toml_str(&merged).expect("parse merged");
    assert_eq!(config.server.port, 9999);
    assert!(merged.contains("scroll_idle_secs"));
    assert!(merged.contains("host"));
}

#[test]
fn scratch_files_are_named_by_language() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_scratch_file(dir.path(), "class A {}", "java").expect("write");
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("java"));
    assert_eq!(fs::read_to_string(&path).expect("read"), "class A {}");

    let path = write_scratch_file(&dir.path().join("nested"), "x", "cobol").expect("write");
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("txt"));
}

#[test]
fn language_suffixes() {
    assert_eq!(lang_suffix("Python"), "py");
    assert_eq!(lang_suffix("kotlin"), "kt");
    assert_eq!(lang_suffix("js"), "js");
    assert_eq!(lang_suffix("TypeScript"), "ts");
    assert_eq!(lang_suffix("plaintext"), "txt");
}
