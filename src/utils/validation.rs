//! Identifier and hostname validation.
//!
//! Symbolic names (app names, git remote names, database names) end up as
//! shell words, filesystem paths, and unix usernames on the remote host.
//! Restricting them to a conservative pattern blocks injection via naming
//! before any command string is built.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn symbol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*$").unwrap())
}

fn hostname_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$").unwrap()
    })
}

/// Check whether a symbolic name is safe to use as a path/user/db fragment.
pub fn is_valid_symbol(name: &str) -> bool {
    symbol_regex().is_match(name)
}

/// Require a symbolic name to match the restrictive identifier pattern.
pub fn require_symbol(name: &str, field: &str) -> Result<()> {
    if is_valid_symbol(name) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} '{}' is not a valid identifier (must match [a-z0-9][a-z0-9_.-]*)",
            field, name
        )))
    }
}

/// Require a candidate hostname to at least look like a DNS name.
///
/// Used for the app's public hostname, which may not resolve yet (DNS for a
/// new site is often configured after deployment), unlike the target server
/// hostname which must resolve before any session opens.
pub fn require_hostname_shape(hostname: &str, field: &str) -> Result<()> {
    if hostname_regex().is_match(&hostname.to_ascii_lowercase()) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} '{}' is not a valid hostname",
            field, hostname
        )))
    }
}
