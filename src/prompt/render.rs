//! Prompt Renderer - Render templates with context variables using Handlebars

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{DeusError, Result};

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    /// Create a new PromptRenderer with default settings
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Missing variables render as empty strings
        handlebars.set_strict_mode(false);
        // Prompts are plain text, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render an ad-hoc template string with any serializable context
    pub fn render_with<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| DeusError::Template(format!("Failed to render template: {}", e)))
    }

    /// Register a named template for later use
    pub fn register_template(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| DeusError::Template(format!("Failed to register template '{}': {}", name, e)))
    }

    /// Render a previously registered template
    pub fn render_named<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        self.handlebars
            .render(name, context)
            .map_err(|e| DeusError::Template(format!("Failed to render template '{}': {}", name, e)))
    }

    /// Check if a named template is registered
    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.get_template(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_simple() {
        let renderer = PromptRenderer::new();
        let result = renderer.render_with("Hello, {{name}}!", &json!({"name": "World"})).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_render_missing_variable_empty_string() {
        let renderer = PromptRenderer::new();
        let result = renderer.render_with("Hello, {{name}}!", &json!({})).unwrap();
        assert_eq!(result, "Hello, !");
    }

    #[test]
    fn test_render_does_not_escape() {
        let renderer = PromptRenderer::new();
        let result = renderer
            .render_with("{{json}}", &json!({"json": "{\"a\": \"<b>\" & 'c'}"}))
            .unwrap();
        assert_eq!(result, "{\"a\": \"<b>\" & 'c'}");
    }

    #[test]
    fn test_register_and_render_named() {
        let mut renderer = PromptRenderer::new();
        assert!(!renderer.has_template("greeting"));
        renderer.register_template("greeting", "Hi {{who}}").unwrap();
        assert!(renderer.has_template("greeting"));
        assert_eq!(renderer.render_named("greeting", &json!({"who": "there"})).unwrap(), "Hi there");
    }

    #[test]
    fn test_render_named_not_found() {
        let renderer = PromptRenderer::new();
        let err = renderer.render_named("missing", &json!({})).unwrap_err();
        assert!(matches!(err, DeusError::Template(_)));
    }

    #[test]
    fn test_register_invalid_template() {
        let mut renderer = PromptRenderer::new();
        assert!(renderer.register_template("bad", "{{#if}}").is_err());
    }

    #[test]
    fn test_render_each_block() {
        let renderer = PromptRenderer::new();
        let result = renderer
            .render_with("{{#each items}}- {{this}}\n{{/each}}", &json!({"items": ["a", "b"]}))
            .unwrap();
        assert_eq!(result, "- a\n- b\n");
    }
}
