//! Named script/config templates and placeholder resolution.
//!
//! Templates are embedded at compile time from `templates/` and looked up by
//! file name. Bodies may contain three placeholder forms, each naming a
//! context key:
//!
//! - `%%name%%` - raw substitution of the context value
//! - `%%esc:name%%` - value passed through shell quoting, safe to embed as
//!   one word in a remote command
//! - `%%inject:name%%` - value treated as nested template text, recursively
//!   resolved, then shell-quoted (used to embed whole generated files as the
//!   payload of an `echo ... > file`)
//!
//! Placeholders naming keys absent from the context are left in place
//! untouched. Shared templates carry placeholders that only some procedures
//! define; a missing key must not break the others.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::utils::shell;

/// Inject recursion cap. A context that chains deeper than this is cyclic
/// in practice and would otherwise loop forever.
const MAX_INJECT_DEPTH: usize = 8;

const ASSETS: &[(&str, &str)] = &[
    (
        "install-ruby.sh",
        include_str!("../../templates/install-ruby.sh"),
    ),
    (
        "create-postgres-database.sh",
        include_str!("../../templates/create-postgres-database.sh"),
    ),
    (
        "initialize-new-app.sh",
        include_str!("../../templates/initialize-new-app.sh"),
    ),
    ("post-receive.sh", include_str!("../../templates/post-receive.sh")),
    ("nginx-site.conf", include_str!("../../templates/nginx-site.conf")),
    (
        "nginx-configure-app.sh",
        include_str!("../../templates/nginx-configure-app.sh"),
    ),
    ("pg_hba.conf", include_str!("../../templates/pg_hba.conf")),
    ("sudoers", include_str!("../../templates/sudoers")),
    ("get-port.sh", include_str!("../../templates/get-port.sh")),
];

/// A context value: either a literal string, or the name of a store template
/// resolved lazily against the same context when the value is substituted.
#[derive(Debug, Clone)]
pub enum Value {
    Literal(String),
    Template(String),
}

/// Named values available to placeholder resolution.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    vars: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), Value::Literal(value.into()));
        self
    }

    pub fn set_template(&mut self, key: impl Into<String>, template: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), Value::Template(template.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }
}

/// Immutable name-to-body mapping over the embedded template assets.
pub struct TemplateStore {
    templates: HashMap<&'static str, &'static str>,
}

impl TemplateStore {
    /// The process-wide store. Assets are indexed once, on first use.
    pub fn global() -> &'static TemplateStore {
        static STORE: OnceLock<TemplateStore> = OnceLock::new();
        STORE.get_or_init(|| TemplateStore {
            templates: ASSETS.iter().copied().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Result<&'static str> {
        self.templates
            .get(name)
            .copied()
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    /// Look up a template and resolve its placeholders.
    pub fn render(&self, name: &str, context: &VariableContext) -> Result<String> {
        let body = self.get(name)?;
        self.resolve(body, context)
    }

    /// Resolve all placeholders in `body` against `context`.
    ///
    /// A single left-to-right scan matches each full `%%...%%` span as a
    /// unit, so one key being a prefix of another (`app`, `app_home`) can
    /// never corrupt the longer key's token.
    pub fn resolve(&self, body: &str, context: &VariableContext) -> Result<String> {
        self.resolve_at_depth(body, context, 0)
    }

    fn resolve_at_depth(
        &self,
        body: &str,
        context: &VariableContext,
        depth: usize,
    ) -> Result<String> {
        if depth > MAX_INJECT_DEPTH {
            return Err(Error::template(format!(
                "inject recursion exceeded {} levels; the variable context is cyclic",
                MAX_INJECT_DEPTH
            )));
        }

        let mut out = String::with_capacity(body.len());
        let mut rest = body;

        while let Some(start) = rest.find("%%") {
            let after_open = &rest[start + 2..];
            let Some(len) = after_open.find("%%") else {
                // Unpaired delimiter, nothing left to resolve
                break;
            };

            out.push_str(&rest[..start]);
            let token = &after_open[..len];
            let span = &rest[start..start + 2 + len + 2];

            match self.substitute(token, context, depth)? {
                Some(replacement) => out.push_str(&replacement),
                // Unknown key: leave the token text in place
                None => out.push_str(span),
            }

            rest = &after_open[len + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Resolve one placeholder token (the text between the `%%` delimiters).
    /// Returns None when the named key is not in the context.
    fn substitute(
        &self,
        token: &str,
        context: &VariableContext,
        depth: usize,
    ) -> Result<Option<String>> {
        let (escape, reinterpret, key) = if let Some(key) = token.strip_prefix("esc:") {
            (true, false, key)
        } else if let Some(key) = token.strip_prefix("inject:") {
            (true, true, key)
        } else {
            (false, false, token)
        };

        let Some(value) = context.get(key) else {
            return Ok(None);
        };

        let text = match value {
            Value::Literal(text) if reinterpret => {
                self.resolve_at_depth(text, context, depth + 1)?
            }
            Value::Literal(text) => text.clone(),
            Value::Template(name) => {
                let nested = self.get(name)?;
                self.resolve_at_depth(nested, context, depth + 1)?
            }
        };

        Ok(Some(if escape { shell::quote_arg(&text) } else { text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> &'static TemplateStore {
        TemplateStore::global()
    }

    fn context(pairs: &[(&str, &str)]) -> VariableContext {
        let mut ctx = VariableContext::new();
        for (key, value) in pairs {
            ctx.set(*key, *value);
        }
        ctx
    }

    #[test]
    fn get_unknown_template_fails() {
        let err = store().get("no-such-template.sh").unwrap_err();
        assert_eq!(err.code(), "template.not_found");
    }

    #[test]
    fn every_asset_is_loaded() {
        for (name, _) in ASSETS {
            assert!(store().get(name).is_ok(), "missing asset {}", name);
        }
    }

    #[test]
    fn raw_substitution() {
        let ctx = context(&[("app", "blog")]);
        let out = store().resolve("dir=/home/app/%%app%%", &ctx).unwrap();
        assert_eq!(out, "dir=/home/app/blog");
    }

    #[test]
    fn resolved_body_has_no_residual_tokens() {
        let ctx = context(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let out = store()
            .resolve("%%a%% %%esc:b%% x %%c%% %%a%%", &ctx)
            .unwrap();
        assert!(!out.contains("%%"), "residual tokens in {:?}", out);
    }

    #[test]
    fn escaped_substitution_quotes_metacharacters() {
        let ctx = context(&[("content", "line with 'quotes' and $VAR")]);
        let out = store().resolve("echo %%esc:content%%", &ctx).unwrap();
        assert_eq!(out, "echo 'line with '\\''quotes'\\'' and $VAR'");
    }

    #[test]
    fn unknown_key_left_literal() {
        let ctx = context(&[("known", "x")]);
        let out = store()
            .resolve("%%known%% %%missing%% %%esc:missing%%", &ctx)
            .unwrap();
        assert_eq!(out, "x %%missing%% %%esc:missing%%");
    }

    #[test]
    fn unpaired_delimiter_left_literal() {
        let ctx = context(&[("a", "1")]);
        let out = store().resolve("%%a%% trailing %%", &ctx).unwrap();
        assert_eq!(out, "1 trailing %%");
    }

    #[test]
    fn prefix_keys_do_not_collide() {
        let ctx = context(&[("app", "short"), ("app_home", "/home/app")]);
        let out = store().resolve("%%app_home%%/%%app%%", &ctx).unwrap();
        assert_eq!(out, "/home/app/short");
    }

    #[test]
    fn inject_literal_resolves_nested_placeholders_then_escapes() {
        let ctx = context(&[("inner", "it's"), ("payload", "value=%%inner%%")]);
        let out = store().resolve("echo %%inject:payload%% > f", &ctx).unwrap();
        // Inner placeholder fully resolved before quoting; no visible token
        assert_eq!(out, "echo 'value=it'\\''s' > f");
    }

    #[test]
    fn inject_template_value_two_levels() {
        // post-receive.sh is a store template; injecting it must resolve its
        // own placeholders before the result is quoted.
        let mut ctx = VariableContext::new();
        ctx.set("app", "blog");
        ctx.set("app_root", "/home/app/blog");
        ctx.set("app_home", "/home/app");
        ctx.set_template("hook", "post-receive.sh");
        let out = store().resolve("echo %%inject:hook%% > hook", &ctx).unwrap();
        assert!(out.starts_with("echo '"));
        assert!(out.contains("/home/app/blog"));
        assert!(!out.contains("%%app_root%%"));
    }

    #[test]
    fn cyclic_inject_reports_template_error() {
        let mut ctx = VariableContext::new();
        ctx.set("a", "%%inject:b%%");
        ctx.set("b", "%%inject:a%%");
        let err = store().resolve("%%inject:a%%", &ctx).unwrap_err();
        assert_eq!(err.code(), "template.invalid");
    }

    #[test]
    fn esc_does_not_reinterpret_literal_contents() {
        // esc quotes the value as-is; only inject re-reads it as template text
        let ctx = context(&[("a", "1"), ("v", "%%a%% x")]);
        let out = store().resolve("%%esc:v%%", &ctx).unwrap();
        assert_eq!(out, "'%%a%% x'");
    }
}
