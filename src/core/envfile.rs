//! Environment file merge and serialization.
//!
//! The authoritative environment for a deployed app is computed as three
//! layers, lowest precedence first:
//!
//! 1. baseline - execution mode, augmented PATH, a fresh secret
//! 2. existing - values already present in the remote `.env`, so a rerun
//!    does not regenerate secrets
//! 3. overrides - caller-supplied values, always win
//!
//! The result is written as POSIX `export KEY="VALUE"` lines, each value
//! individually quoted so the file survives re-sourcing. PATH is the one
//! key whose value is double-quoted even when it mentions `$` — the
//! baseline deliberately references `$PATH` and must expand on sourcing.
//! Any other value containing `$` is single-quoted so caller-supplied data
//! stays literal.

use std::collections::BTreeMap;

use crate::utils::shell;

/// Ordered key/value environment. BTreeMap keeps serialization stable
/// across runs, which keeps remote diffs readable.
pub type Env = BTreeMap<String, String>;

/// Merge the three environment layers in documented precedence.
pub fn merge(baseline: &Env, existing: &Env, overrides: &Env) -> Env {
    let mut merged = baseline.clone();
    for (key, value) in existing {
        merged.insert(key.clone(), value.clone());
    }
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Serialize as shell-exportable assignments.
///
/// PATH is double-quoted so its `$PATH` reference expands when the file is
/// sourced. Every other value containing `$` is single-quoted (via the
/// command-word escaping) so it re-sources as exactly the stored literal.
pub fn serialize(env: &Env) -> String {
    let mut out = String::new();
    for (key, value) in env {
        if key != "PATH" && value.contains('$') {
            out.push_str(&format!("export {}={}\n", key, shell::quote_path(value)));
        } else {
            out.push_str(&format!("export {}=\"{}\"\n", key, escape_value(value)));
        }
    }
    out
}

/// Parse an env file written by `serialize` (or a plain `KEY=VALUE` dotenv
/// left by an earlier tool). Unparseable lines and comments are skipped.
pub fn parse(content: &str) -> Env {
    let mut env = Env::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        env.insert(key.to_string(), unquote(value.trim()));
    }
    env
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        inner
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
            .replace("\\`", "`")
    } else if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        // Reverse the single-quote form, including the '\'' escape
        inner.replace("'\\''", "'")
    } else {
        value.to_string()
    }
}
