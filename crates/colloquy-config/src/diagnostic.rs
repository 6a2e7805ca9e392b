// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics rendered through miette.
//!
//! Keys are always reported by their dotted path (`lock.lease_ttl_ms`).
//! An unknown key gets the closest name from its own section, or the section
//! it actually belongs to when it was put under the wrong header. Type and
//! validation failures point at the line that set the value, or name the
//! `COLLOQUY_*` variable when the environment set it.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::ENV_PREFIX;
use crate::model::ColloquyConfig;

/// Jaro-Winkler score a known key needs to be offered as a correction.
const SIMILARITY_FLOOR: f64 = 0.75;

/// A configuration problem, ready for miette to render.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{path}`")]
    #[diagnostic(
        code(colloquy::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The unrecognized name as written.
        key: String,
        /// Dotted path of the unrecognized name.
        path: String,
        /// Close match in the same section, or the dotted path of the same
        /// name in another section.
        suggestion: Option<String>,
        /// Keys accepted where the unknown one was found.
        valid_keys: String,
        #[label("not a colloquy setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` expects {expected}, found {found}")]
    #[diagnostic(
        code(colloquy::config::invalid_type),
        help("{}", origin_help(origin.as_deref()))
    )]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        /// File or environment variable the value came from.
        origin: Option<String>,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(colloquy::config::missing_key),
        help("add `{key} = <value>` to colloquy.toml")
    )]
    MissingKey { key: String },

    /// A value that parsed but is out of range or inconsistent.
    #[error("invalid value: {message}")]
    #[diagnostic(code(colloquy::config::validation))]
    Validation {
        /// Dotted path of the offending key.
        key: String,
        message: String,
        #[label("set here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(colloquy::config::other))]
    Other(String),
}

impl ConfigError {
    /// A validation failure for `key`, not yet located in any source file.
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
            span: None,
            src: None,
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) if s.contains('.') => format!("`{s}` is a known key; move it under its section"),
        Some(s) => format!("did you mean `{s}`? Valid keys here: {valid_keys}"),
        None => format!("valid keys here: {valid_keys}"),
    }
}

fn origin_help(origin: Option<&str>) -> String {
    match origin {
        Some(origin) => format!("the value comes from {origin}"),
        None => "check colloquy.toml and COLLOQUY_* environment variables".to_string(),
    }
}

/// Environment variable that overrides the dotted config `key`.
pub fn env_var_for(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.replace('.', "_").to_ascii_uppercase())
}

/// Convert every error inside a `figment::Error` into a [`ConfigError`].
///
/// `sources` holds `(path, content)` of each TOML file that was merged, used
/// to attach spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let section: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate(&error, section.first().map(String::as_str), field, sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        path: dotted(&section, field),
                        suggestion: suggest_for(section.first().map(String::as_str), field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&section, field),
                },
                Kind::InvalidType(actual, expected) => {
                    let key = section.join(".");
                    let (span, src) = match section.split_last() {
                        Some((field, parent)) => {
                            locate(&error, parent.first().map(String::as_str), field, sources)
                        }
                        None => (None, None),
                    };
                    ConfigError::InvalidType {
                        origin: origin_of(&error, &key),
                        key,
                        found: actual.to_string(),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Point each validation error at the file line that set its key.
///
/// `sources` is in precedence order, highest first, so the first file that
/// sets a key is the one whose value won.
pub fn locate_validation_errors(errors: &mut [ConfigError], sources: &[(String, String)]) {
    for error in errors.iter_mut() {
        let ConfigError::Validation { key, span, src, .. } = error else {
            continue;
        };
        let (section, field) = match key.split_once('.') {
            Some((section, field)) => (Some(section), field),
            None => (None, key.as_str()),
        };
        let found = sources.iter().find_map(|(path, content)| {
            find_key_offset(content, section, field).map(|offset| (path, content, offset))
        });
        if let Some((path, content, offset)) = found {
            *span = Some(SourceSpan::new(offset.into(), field.len()));
            *src = Some(NamedSource::new(path, content.clone()));
        }
    }
}

fn dotted(section: &[String], field: &str) -> String {
    if section.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", section.join("."))
    }
}

/// Where the failing value came from: a TOML file path or the env var name.
fn origin_of(error: &figment::Error, key: &str) -> Option<String> {
    let metadata = error.metadata.as_ref()?;
    match &metadata.source {
        Some(figment::Source::File(path)) => Some(path.display().to_string()),
        _ if metadata.name.contains("environment") => Some(env_var_for(key)),
        _ => None,
    }
}

fn locate(
    error: &figment::Error,
    section: Option<&str>,
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let file = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => path.display().to_string(),
        // Inline strings are registered under a placeholder name.
        _ => match sources {
            [(path, _)] => path.clone(),
            _ => return (None, None),
        },
    };
    let Some((path, content)) = sources.iter().find(|(p, _)| *p == file) else {
        return (None, None);
    };
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` table of `content`
/// (top level when `section` is `None`).
pub fn find_key_offset(content: &str, section: Option<&str>, field: &str) -> Option<usize> {
    let mut table: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            table = header.split(']').next().map(str::trim);
        } else if table == section
            && trimmed.split_once('=').map(|(key, _)| key.trim()) == Some(field)
        {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

/// Closest key in `valid_keys`, if any is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SIMILARITY_FLOOR)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// A same-section correction, or else the dotted path of the same name in
/// another section.
fn suggest_for(section: Option<&str>, field: &str, valid_keys: &[&str]) -> Option<String> {
    suggest_key(field, valid_keys).or_else(|| {
        section_keys()
            .into_iter()
            .find(|(name, keys)| Some(name.as_str()) != section && keys.iter().any(|k| k == field))
            .map(|(name, _)| format!("{name}.{field}"))
    })
}

/// Every `(section, keys)` pair of the config model, read off its defaults.
/// Optional keys without a default are absent.
fn section_keys() -> Vec<(String, Vec<String>)> {
    let Ok(toml::Value::Table(root)) = toml::Value::try_from(ColloquyConfig::default()) else {
        return Vec::new();
    };
    root.into_iter()
        .filter_map(|(name, value)| match value {
            toml::Value::Table(table) => Some((name, table.keys().cloned().collect())),
            _ => None,
        })
        .collect()
}

/// Render each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
