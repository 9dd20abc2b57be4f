//! Core behavioral traits for settle components
//!
//! The reconciler depends on these traits instead of concrete engines so tests can
//! substitute recording doubles.

use crate::Result;

/// Template renderer interface
///
/// Abstracts template rendering to decouple the reconciler from the template engine.
///
/// Uses `serde_json::Value` for context to ensure trait object safety.
/// Any struct implementing `serde::Serialize` can be converted to `Value` with `serde_json::to_value()`.
///
/// # Examples
///
/// ```ignore
/// use settle_core::TemplateRenderer;
///
/// fn render_greeting(renderer: &dyn TemplateRenderer) -> Result<String> {
///     let value = serde_json::json!({ "name": "Alice" });
///     renderer.render_named_str("greeting.tmpl", "Hello {{ name }}!", &value)
/// }
/// ```
pub trait TemplateRenderer: Send + Sync {
    /// Render a template string with the given context
    ///
    /// `name` identifies the template in error messages (usually the source path).
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed or references an undefined value.
    fn render_named_str(
        &self,
        name: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<String>;
}
