use minijinja::Environment;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Template rendering failure.
#[derive(Debug)]
pub enum RenderError {
    /// No template registered under that name
    NotFound(String),
    /// The engine rejected the template or the data
    Engine(String),
    /// Reading templates from disk failed
    Io(io::Error),
    /// The dispatcher was built without a renderer
    Unconfigured,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotFound(name) => write!(f, "template '{name}' not found"),
            RenderError::Engine(msg) => write!(f, "template error: {msg}"),
            RenderError::Io(e) => write!(f, "template io error: {e}"),
            RenderError::Unconfigured => f.write_str("no template renderer configured"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<io::Error> for RenderError {
    fn from(e: io::Error) -> Self {
        RenderError::Io(e)
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(e: minijinja::Error) -> Self {
        RenderError::Engine(e.to_string())
    }
}

/// Renders a named template with JSON data.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError>;
}

/// [`TemplateRenderer`] backed by `minijinja`, templates held in memory.
#[derive(Debug, Default, Clone)]
pub struct MiniJinjaRenderer {
    templates: HashMap<String, String>,
}

impl MiniJinjaRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under `name`, replacing any earlier template.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    /// Load every `*.html` file directly under `dir`, named by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, RenderError> {
        let mut renderer = Self::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let source = fs::read_to_string(&path)?;
                renderer.add_template(name, source);
            }
        }
        Ok(renderer)
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| RenderError::NotFound(name.to_string()))?;
        let mut env = Environment::new();
        env.add_template(name, source)?;
        let tmpl = env.get_template(name)?;
        Ok(tmpl.render(data)?)
    }
}
