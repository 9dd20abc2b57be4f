//! Template engine implementation
//!
//! The engine wraps minijinja and provides template rendering with custom functions.
//! Undefined values are errors: a template referencing a property that is not
//! bound fails instead of rendering an empty string. Booleans render as
//! `true`/`false`, the spelling configuration files expect.

use crate::functions;
use crate::{Error, Result};
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, ErrorKind, Output, State, UndefinedBehavior, escape_formatter};
use serde::Serialize;
use std::fmt::Write;

/// Template engine for rendering templates
pub struct TemplateEngine {
    /// The minijinja environment
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with the standard functions and filters
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();

        // Jinja2 standard whitespace control; files keep their final newline
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_formatter(format_value);

        env.add_function("env", functions::env);
        env.add_function("os", functions::os);
        env.add_function("arch", functions::arch);
        env.add_function("hostname", functions::hostname);
        env.add_function("joinPath", functions::join_path);
        env.add_function("lookPath", functions::look_path);
        env.add_function("split", functions::split);
        env.add_function("regexMatch", functions::regex_match);

        env.add_filter("quote", functions::quote);
        env.add_filter("trim", functions::trim);
        env.add_filter("toJson", functions::to_json);

        Self { env }
    }

    /// Render a template string with a name used in error messages
    ///
    /// # Examples
    ///
    /// ```
    /// use settle_template::TemplateEngine;
    ///
    /// let engine = TemplateEngine::new();
    /// let ctx = serde_json::json!({ "favlang": "rust" });
    ///
    /// let result = engine.render_named_str("fav.txt.tmpl", "I like {{ favlang }}\n", &ctx).unwrap();
    /// assert_eq!(result, "I like rust\n");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if template rendering fails
    pub fn render_named_str<S: Serialize>(
        &self,
        name: &str,
        template: &str,
        context: S,
    ) -> Result<String> {
        self.env
            .render_named_str(name, template, context)
            .map_err(Error::from)
    }

    /// Get a reference to the underlying minijinja environment
    pub fn env(&self) -> &Environment<'static> {
        &self.env
    }

    /// Get a mutable reference to the underlying minijinja environment
    ///
    /// Hook evaluation registers its run-scoped functions here.
    pub fn env_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

fn format_value(
    out: &mut Output<'_>,
    state: &State<'_, '_>,
    value: &Value,
) -> std::result::Result<(), minijinja::Error> {
    if value.kind() == ValueKind::Bool {
        return out
            .write_str(if value.is_true() { "true" } else { "false" })
            .map_err(|e| minijinja::Error::new(ErrorKind::WriteFailure, e.to_string()));
    }
    escape_formatter(out, state, value)
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl settle_core::TemplateRenderer for TemplateEngine {
    fn render_named_str(
        &self,
        name: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> settle_core::Result<String> {
        self.env
            .render_named_str(name, template, context)
            .map_err(|e| settle_core::Error::template(name, Error::from(e).to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;
    use settle_core::TemplateRenderer;

    #[test]
    fn test_render_keeps_trailing_newline() {
        let engine = TemplateEngine::new();
        let out = engine
            .render_named_str("t", "{{ a }}\n", json!({ "a": 1 }))
            .unwrap();
        assert_eq!(out, "1\n");
    }

    #[test]
    fn test_undefined_is_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render_named_str("fav.tmpl", "{{ missing }}", json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("fav.tmpl"));
    }

    #[test]
    fn test_malformed_is_error() {
        let engine = TemplateEngine::new();
        assert!(engine.render_named_str("t", "{% if %}", json!({})).is_err());
    }

    #[test]
    fn test_trim_blocks() {
        let engine = TemplateEngine::new();
        let template = "{% if on %}\nyes\n{% endif %}\n";
        let out = engine
            .render_named_str("t", template, json!({ "on": true }))
            .unwrap();
        assert_eq!(out, "yes\n");
    }

    #[test]
    fn test_booleans_render_lowercase() {
        let engine = TemplateEngine::new();
        let out = engine
            .render_named_str(
                "t",
                "{{ on }}|{{ not on }}|{{ missing is defined }}|{{ [on] | length }}",
                json!({ "on": true }),
            )
            .unwrap();
        assert_eq!(out, "true|false|false|1");
    }

    #[test]
    fn test_renderer_trait_maps_error() {
        let engine = TemplateEngine::new();
        let renderer: &dyn TemplateRenderer = &engine;
        let err = renderer
            .render_named_str("conf.tmpl", "{{ nope }}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, settle_core::Error::Template { .. }));
    }

    #[test]
    fn test_functions_registered() {
        let engine = TemplateEngine::new();
        let out = engine
            .render_named_str("t", "{{ joinPath('a', 'b') }}|{{ 'x' | quote }}", json!({}))
            .unwrap();
        assert_eq!(out, "a/b|\"x\"");
    }
}
