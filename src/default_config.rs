pub const DEFAULT_CONFIG_TOML: &str = r#"# testgen-chat configuration

[server]
# Loopback address of the generation server.
host = "127.0.0.1"
port = 8080

[panel]
# Seconds after a manual scroll before the chat follows new turns again.
scroll_idle_secs = 3
# Directory for code opened from the chat. Empty uses the system temp dir.
scratch_dir = ""
"#;
