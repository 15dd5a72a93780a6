// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rich configuration diagnostics.
//!
//! Figment reports deserialization problems as flat error values; this
//! module upgrades them to miette diagnostics that point at the offending
//! line of `stagelink.toml` and suggest the nearest valid key for typos.
//! Stagelink's config is four flat sections, so span resolution is a plain
//! section-aware line scan rather than a general TOML query.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
/// 0.75 catches `max_atempts` -> `max_attempts` while filtering noise.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error rendered through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key not accepted by its section (`deny_unknown_fields`).
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(code(stagelink::config::unknown_key), help("{help}"))]
    UnknownKey {
        key: String,
        /// Pre-rendered help line: suggestion (if any) plus the valid keys.
        help: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong TOML type.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(stagelink::config::invalid_value), help("expected {expected}"))]
    InvalidValue {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required key absent from every layer.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(stagelink::config::missing_key),
        help("add `{key} = <value>` to your stagelink.toml")
    )]
    MissingKey { key: String },

    /// A semantic constraint violated by an otherwise well-formed value.
    #[error("validation error: {message}")]
    #[diagnostic(code(stagelink::config::validation))]
    Validation { message: String },

    /// Anything figment reports that has no richer mapping.
    #[error("configuration error: {0}")]
    #[diagnostic(code(stagelink::config::other))]
    Other(String),
}

/// Convert a `figment::Error` (which may bundle several problems) into
/// diagnostics, resolving source spans against the given `(path, content)`
/// TOML sources.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let section = error.path.first().cloned();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    unknown_key(field, &expected.to_vec(), section.as_deref(), toml_sources)
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.clone().into_owned(),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidValue {
                    key: error.path.join("."),
                    detail: format!("found {actual}"),
                    expected: expected.to_string(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Build the unknown-key diagnostic: fuzzy suggestion, valid-key listing,
/// and (when one of the sources contains the key) a labeled span.
fn unknown_key(
    field: &str,
    valid_keys: &[&str],
    section: Option<&str>,
    toml_sources: &[(String, String)],
) -> ConfigError {
    let listing = valid_keys.join(", ");
    let help = match suggest_key(field, valid_keys) {
        Some(suggestion) => format!("did you mean `{suggestion}`? valid keys: {listing}"),
        None => format!("valid keys: {listing}"),
    };

    let located = toml_sources.iter().find_map(|(path, content)| {
        locate_key(content, section, field)
            .map(|span| (span, NamedSource::new(path, content.clone())))
    });
    let (span, src) = match located {
        Some((span, src)) => (Some(span), Some(src)),
        None => (None, None),
    };

    ConfigError::UnknownKey {
        key: field.to_string(),
        help,
        span,
        src,
    }
}

/// Byte span of `key` in `content`, restricted to `section` when given.
///
/// Scans line by line tracking `[section]` headers, so a key that also
/// appears under a different section is never misattributed. `None` section
/// means the key must appear before the first header.
pub fn locate_key(content: &str, section: Option<&str>, key: &str) -> Option<SourceSpan> {
    let mut in_section = section.is_none();
    let mut offset = 0;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            in_section = section == Some(header.trim());
        } else if in_section {
            let rest = line.trim_start();
            let indent = line.len() - rest.len();
            if let Some(after) = rest.strip_prefix(key) {
                if after.trim_start().starts_with('=') {
                    return Some(SourceSpan::new((offset + indent).into(), key.len()));
                }
            }
        }
        offset += line.len() + 1;
    }

    None
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler
            .render_report(&mut out, error as &dyn Diagnostic)
            .is_err()
        {
            out.push_str(&format!("error: {error}\n"));
        }
    }
    eprint!("{out}");
}
