use std::fs;
use std::io;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::wire::Role;

#[derive(Debug, Clone)]
pub struct Theme {
    pub title_bg: Color,
    pub chat_bg: Color,
    pub input_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub user_fg: Color,
    pub assistant_fg: Color,
    pub system_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title_bg: Color::Rgb(40, 40, 40),
            chat_bg: Color::Rgb(30, 30, 30),
            input_bg: Color::Rgb(50, 50, 50),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(160, 160, 160),
            user_fg: Color::Rgb(80, 190, 100),
            assistant_fg: Color::Rgb(230, 150, 60),
            system_fg: Color::Rgb(120, 160, 220),
        }
    }
}

impl Theme {
    /// A missing file is normal and yields the defaults quietly.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    warn!(path = %path_ref.display(), error = %err, "invalid theme file; using defaults");
                    Self::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path_ref.display(), "no theme file");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path_ref.display(), error = %err, "unreadable theme file; using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let base = Self::default();
        let colors = cfg.colors;
        let pick = |value: Option<RgbToml>, fallback: Color| value.map_or(fallback, |rgb| rgb.to_color());
        Ok(Self {
            title_bg: pick(colors.title_bg, base.title_bg),
            chat_bg: pick(colors.chat_bg, base.chat_bg),
            input_bg: pick(colors.input_bg, base.input_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            user_fg: pick(colors.user_fg, base.user_fg),
            assistant_fg: pick(colors.assistant_fg, base.assistant_fg),
            system_fg: pick(colors.system_fg, base.system_fg),
        })
    }

    pub fn role_fg(&self, role: &Role) -> Color {
        match role {
            Role::User => self.user_fg,
            Role::Assistant => self.assistant_fg,
            Role::System => self.system_fg,
            Role::Other(_) => self.muted_fg,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    #[serde(default)]
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
struct ThemeColorsToml {
    title_bg: Option<RgbToml>,
    chat_bg: Option<RgbToml>,
    input_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    user_fg: Option<RgbToml>,
    assistant_fg: Option<RgbToml>,
    system_fg: Option<RgbToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
