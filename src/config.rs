//! Configuration for rawcon.
//!
//! Settings are read from `~/.rawcon/config.toml`. Every key is optional;
//! a missing or unreadable file gives the defaults.
//!
//! ```toml
//! # auto, unix, windows or none
//! terminal = "auto"
//!
//! # false strips every escape sequence, even with force_ansi
//! enable_ansi = true
//! # pass sequences through without checking for a tty
//! force_ansi = false
//!
//! enable_echo = true
//! # let Ctrl+C raise a signal
//! enable_interrupt = false
//! enable_backspace = true
//!
//! # finished line buffers kept for reuse
//! max_line_buffers = 8
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::terminal::TerminalType;

/// Directory under the home directory holding config and log
pub const CONFIG_DIR: &str = ".rawcon";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal driver to use
    pub terminal: TerminalType,
    pub enable_ansi: bool,
    pub force_ansi: bool,
    /// Echo at startup
    pub enable_echo: bool,
    /// Ctrl+C signal delivery at startup
    pub enable_interrupt: bool,
    pub enable_backspace: bool,
    pub max_line_buffers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terminal: TerminalType::Auto,
            enable_ansi: true,
            force_ansi: false,
            enable_echo: true,
            enable_interrupt: false,
            enable_backspace: true,
            max_line_buffers: 8,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(content) => match Self::from_toml_str(&content) {
                        Ok(config) => return config,
                        Err(e) => warn!("Ignoring invalid {}: {}", path.display(), e),
                    },
                    Err(e) => warn!("Failed to read {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `~/.rawcon/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        Self::dir().map(|dir| dir.join("config.toml"))
    }

    /// `~/.rawcon`, if a home directory is known
    pub fn dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(CONFIG_DIR))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
