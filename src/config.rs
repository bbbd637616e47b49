use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
#[cfg(unix)]
use std::{fs::Permissions, os::unix::fs::PermissionsExt};

use serde::Deserialize;

use crate::default_config::DEFAULT_CONFIG_TOML;

const CONFIG_DIR_NAME: &str = ".testgen";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "testgen.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub scroll_idle: Duration,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub panel: PanelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_toml_str("").unwrap_or_else(|_| Self::emergency_fallback())
    }
}

impl AppConfig {
    /// Reads `path` when given, otherwise `~/.testgen/config.toml` (created
    /// from the built-in defaults on first use).
    pub fn load(path: Option<&Path>) -> io::Result<Self> {
        let text = match path {
            Some(path) => fs::read_to_string(path)?,
            None => {
                let config_file = ensure_default_config()?;
                fs::read_to_string(config_file)?
            }
        };
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> io::Result<Self> {
        let defaults = parse_config(DEFAULT_CONFIG_TOML)?;
        let overrides = parse_config(text)?;
        defaults.merged_with(overrides).into_runtime()
    }

    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.server.host = host;
        }
        if let Some(port) = port.filter(|port| *port != 0) {
            self.server.port = port;
        }
        self
    }

    fn emergency_fallback() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            panel: PanelConfig {
                scroll_idle: Duration::from_secs(3),
                scratch_dir: env::temp_dir(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server: ServerSection,
    panel: PanelSection,
}

impl ConfigFile {
    fn merged_with(self, override_cfg: Self) -> Self {
        Self {
            server: ServerSection {
                host: override_cfg.server.host.or(self.server.host),
                port: override_cfg.server.port.or(self.server.port),
            },
            panel: PanelSection {
                scroll_idle_secs: override_cfg
                    .panel
                    .scroll_idle_secs
                    .or(self.panel.scroll_idle_secs),
                scratch_dir: override_cfg.panel.scratch_dir.or(self.panel.scratch_dir),
            },
        }
    }

    fn into_runtime(self) -> io::Result<AppConfig> {
        let host = self
            .server
            .host
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid_data("server.host must not be empty"))?;
        let port = self
            .server
            .port
            .filter(|port| *port != 0)
            .ok_or_else(|| invalid_data("server.port must be between 1 and 65535"))?;
        let scratch_dir = self
            .panel
            .scratch_dir
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        Ok(AppConfig {
            server: ServerConfig { host, port },
            panel: PanelConfig {
                scroll_idle: Duration::from_secs(self.panel.scroll_idle_secs.unwrap_or(3)),
                scratch_dir,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct PanelSection {
    scroll_idle_secs: Option<u64>,
    scratch_dir: Option<String>,
}

fn parse_config(text: &str) -> io::Result<ConfigFile> {
    toml::from_str::<ConfigFile>(text).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

pub fn home_dir() -> io::Result<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))
}

pub fn config_dir() -> io::Result<PathBuf> {
    let dir = home_dir()?.join(CONFIG_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn log_file_path() -> io::Result<PathBuf> {
    Ok(config_dir()?.join(LOG_FILE_NAME))
}

/// Makes sure the user config exists and carries every default key, keeping
/// whatever the user already set.
pub fn ensure_default_config() -> io::Result<PathBuf> {
    ensure_default_config_in(&config_dir()?)
}

fn ensure_default_config_in(dir: &Path) -> io::Result<PathBuf> {
    let config_file = dir.join(CONFIG_FILE_NAME);
    let existing_text = match fs::read_to_string(&config_file) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(err),
    };
    let merged_text = merge_with_defaults(existing_text.as_deref())?;
    if existing_text.as_deref() != Some(merged_text.as_str()) {
        write_file_atomic(&config_file, &merged_text)?;
    }
    Ok(config_file)
}

fn merge_with_defaults(user_text: Option<&str>) -> io::Result<String> {
    let user_text = user_text.unwrap_or_default();
    if user_text.trim().is_empty() {
        return Ok(DEFAULT_CONFIG_TOML.to_string());
    }
    let mut merged = parse_table(DEFAULT_CONFIG_TOML)?;
    let user = parse_table(user_text)?;
    merge_tables(&mut merged, user.clone());
    // Keep the user's file byte-for-byte when it already has every key.
    if user == merged {
        return Ok(user_text.to_string());
    }
    toml::to_string_pretty(&merged).map_err(io::Error::other)
}

fn parse_table(text: &str) -> io::Result<toml::Value> {
    toml::from_str(text).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn merge_tables(base: &mut toml::Value, user: toml::Value) {
    match (base, user) {
        (toml::Value::Table(base_map), toml::Value::Table(user_map)) => {
            for (key, user_item) in user_map {
                match base_map.get_mut(&key) {
                    Some(base_item) => merge_tables(base_item, user_item),
                    None => {
                        base_map.insert(key, user_item);
                    }
                }
            }
        }
        (slot, user_item) => *slot = user_item,
    }
}

fn write_file_atomic(path: &Path, text: &str) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "config path has no parent directory")
    })?;
    fs::create_dir_all(parent)?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp = parent.join(format!(".{CONFIG_FILE_NAME}.{}-{nanos}", std::process::id()));
    let file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
    restrict_to_owner(&tmp)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Writes code opened from the chat into `dir`, named by language.
pub fn write_scratch_file(dir: &Path, content: &str, lang: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let path = dir.join(format!("testgen-{nanos}.{}", lang_suffix(lang)));
    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    Ok(path)
}

pub fn lang_suffix(lang: &str) -> &'static str {
    match lang.trim().to_ascii_lowercase().as_str() {
        "java" => "java",
        "python" | "py" => "py",
        "kotlin" | "kt" => "kt",
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        _ => "txt",
    }
}

#[cfg(test)]
#[path = "../tests/unit/config_tests.rs"]
mod tests;
