//! `.env` configuration files.
//!
//! | Line | Meaning |
//! |------|---------|
//! | `KEY=VALUE` | set `KEY` |
//! | `export KEY=VALUE` | same; the `export ` prefix is ignored |
//! | `KEY="a b"` / `KEY='a b'` | quoted value (`\n`, `\t`, `\"`, `\\` escapes inside double quotes) |
//! | `# ...` | comment, ignored |
//!
//! An unquoted value ends at ` #` (inline comment).  Bad lines are reported
//! and skipped; the rest of the file still loads.
//!
//! Files are layered: explicit `-e` files first, then `./.env`, then
//! `<config dir>/osun.env` from [`directories::ProjectDirs`].  The first
//! file to define a key wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Loaded configuration entries.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Config {
    vars: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `.env` text.  Returns the config and any per-line errors.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Ok((key, value)) => {
                    config.vars.insert(key, value);
                }
                Err(message) => errors.push(ConfigError {
                    line: lineno,
                    message,
                }),
            }
        }

        (config, errors)
    }

    /// Read and parse a `.env` file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Add entries from `other` whose keys are not already set.
    pub fn merge_missing(&mut self, other: Config) {
        for (k, v) in other.vars {
            self.vars.entry(k).or_insert(v);
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `PORT` entry, if present and valid.
    pub fn port(&self) -> Result<Option<u16>, String> {
        match self.get("PORT") {
            None => Ok(None),
            Some(p) => p
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| format!("invalid PORT {p:?}")),
        }
    }
}

// ── Layered loading ───────────────────────────────────────────────────────────

/// The per-user config file, e.g. `~/.config/osun/osun.env` on Linux.
pub fn user_env_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "osun").map(|d| d.config_dir().join("osun.env"))
}

/// Per-file problems found while loading.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Files that were read, in priority order.
    pub loaded: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, ConfigError)>,
}

/// Load `explicit` files (which must exist), then `./.env` and the per-user
/// file (each optional).
pub fn load_layered(explicit: &[PathBuf]) -> std::io::Result<(Config, LoadReport)> {
    let mut config = Config::new();
    let mut report = LoadReport::default();

    let mut absorb = |path: &Path, (cfg, errs): (Config, Vec<ConfigError>)| {
        tracing::debug!(path = %path.display(), entries = cfg.len(), "loaded env file");
        config.merge_missing(cfg);
        report.loaded.push(path.to_owned());
        report
            .errors
            .extend(errs.into_iter().map(|e| (path.to_owned(), e)));
    };

    for path in explicit {
        absorb(path, Config::load_file(path)?);
    }
    let optional = std::iter::once(PathBuf::from(".env")).chain(user_env_file());
    for path in optional {
        if path.is_file() {
            match Config::load_file(&path) {
                Ok(loaded) => absorb(&path, loaded),
                Err(e) => tracing::warn!(path = %path.display(), "cannot read env file: {e}"),
            }
        }
    }
    Ok((config, report))
}

// ── Line parsing ──────────────────────────────────────────────────────────────

fn parse_line(line: &str) -> Result<(String, String), String> {
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let Some((key, value)) = line.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got {line:?}"));
    };
    let key = key.trim();
    if !is_valid_key(key) {
        return Err(format!("invalid key {key:?}"));
    }
    Ok((key.to_owned(), parse_value(value.trim())?))
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_value(v: &str) -> Result<String, String> {
    if let Some(rest) = v.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(out),
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                c => out.push(c),
            }
        }
        return Err("unterminated double quote".into());
    }
    if let Some(rest) = v.strip_prefix('\'') {
        return match rest.split_once('\'') {
            Some((inner, _)) => Ok(inner.to_owned()),
            None => Err("unterminated single quote".into()),
        };
    }
    let v = v.split_once(" #").map_or(v, |(before, _)| before);
    Ok(v.trim_end().to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
