//! Key-value settings file for the port configuration.
//!
//! One `key=value` pair per line. Lines starting with `#` or `!` are comments. `\`, `=`,
//! `:` and line breaks inside keys or values are written backslash-escaped.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;
use crate::serial::PortSettings;

const HEADER: &str = "# ---Port Settings---";

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/sterm-x/comm.properties`, or the working directory when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("sterm-x"))
            .unwrap_or_default()
            .join("comm.properties")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored pairs. A missing file is an empty map.
    pub fn load(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        if !self.path.exists() {
            log::info!("No port settings at {}, using defaults", self.path.display());
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(parse(&text))
    }

    pub fn load_settings(&self) -> Result<PortSettings, ConfigError> {
        Ok(PortSettings::from_strings(&self.load()?))
    }

    pub fn save(&self, settings: &PortSettings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, render(&settings.to_strings()))?;
        log::info!("Saved port settings to {}", self.path.display());
        Ok(())
    }
}

fn parse(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        match split_pair(line) {
            Some((key, value)) => {
                map.insert(unescape(key.trim_end()), unescape(value.trim_start()));
            }
            None => log::debug!("Skipping settings line without '=': {}", line),
        }
    }
    map
}

/// Split at the first unescaped `=`.
fn split_pair(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn render(map: &BTreeMap<String, String>) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (key, value) in map {
        out.push_str(&escape(key));
        out.push('=');
        out.push_str(&escape(value));
        out.push('\n');
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            ':' => out.push_str("\\:"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
