//! # View Pipeline
//!
//! Server-side HTML rendering, built once at startup and shared by every
//! request handler:
//!
//! 1. [`TemplateResolver`] maps a logical view name to a template location
//!    (`/WEB-INF/templates` + name + `.html`) and fixes encoding and mode.
//! 2. [`TemplateEngine`] holds the compiled askama templates, registered by
//!    logical name, and renders them from a serializable model.
//! 3. [`ViewResolver`] turns a view name into a renderable [`View`] or a
//!    not-found error.
//!
//! Templates are compiled into the binary by askama from the `WEB-INF/templates`
//! directory configured in `askama.toml`. The configured prefix must name that
//! directory. Escaping follows the template file extension, so the configured
//! mode must agree with the suffix.

pub mod templates;

use crate::config::ViewSettings;
use askama::Template;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use templates::{register_builtin_views, ErrorView, IndexView};

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("View '{name}' not found (expected template at {location})")]
    NotFound { name: String, location: String },

    #[error("Invalid view name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("View '{name}' is already registered")]
    DuplicateView { name: String },

    #[error("Template for view '{name}' has extension '{extension}' but views use suffix '{suffix}'")]
    SuffixMismatch {
        name: String,
        extension: String,
        suffix: String,
    },

    #[error("Model for view '{name}' does not fit the template: {error}")]
    Model { name: String, error: String },

    #[error("Failed to render view '{name}': {error}")]
    Render { name: String, error: String },

    #[error("Invalid view setting '{field}': {reason}")]
    Configuration { field: String, reason: String },
}

impl ViewError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type ViewResult<T> = Result<T, ViewError>;

/// Template root compiled in by askama (`askama.toml`)
pub const TEMPLATE_ROOT: &str = "/WEB-INF/templates";

/// Extensions askama renders with HTML escaping
const MARKUP_EXTENSIONS: [&str; 4] = ["html", "htm", "svg", "xml"];

/// How template output is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMode {
    /// Markup, model values are HTML-escaped
    Html,
    /// Plain text, requires a non-markup suffix such as `.txt`
    Text,
}

impl TemplateMode {
    pub fn parse(raw: &str) -> ViewResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HTML" => Ok(TemplateMode::Html),
            "TEXT" => Ok(TemplateMode::Text),
            _ => Err(ViewError::configuration(
                "views.mode",
                format!("unsupported template mode '{raw}', expected HTML or TEXT"),
            )),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TemplateMode::Html => "text/html",
            TemplateMode::Text => "text/plain",
        }
    }
}

/// Maps logical view names to template locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateResolver {
    prefix: String,
    suffix: String,
    encoding: String,
    mode: TemplateMode,
}

impl TemplateResolver {
    pub fn from_settings(settings: &ViewSettings) -> ViewResult<Self> {
        let encoding = match settings.encoding.trim().to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => "UTF-8".to_string(),
            _ => {
                return Err(ViewError::configuration(
                    "views.encoding",
                    format!(
                        "unsupported character encoding '{}', templates are UTF-8",
                        settings.encoding
                    ),
                ))
            }
        };

        if !settings.suffix.starts_with('.') || settings.suffix.len() < 2 {
            return Err(ViewError::configuration(
                "views.suffix",
                format!("'{}' is not a file extension such as '.html'", settings.suffix),
            ));
        }

        let prefix = format!("/{}", settings.prefix.trim_matches('/'));
        if prefix != TEMPLATE_ROOT {
            return Err(ViewError::configuration(
                "views.prefix",
                format!(
                    "templates are compiled from '{TEMPLATE_ROOT}', '{}' cannot be resolved",
                    settings.prefix
                ),
            ));
        }

        let mode = TemplateMode::parse(&settings.mode)?;
        let extension = settings.suffix.trim_start_matches('.').to_ascii_lowercase();
        let escaped = MARKUP_EXTENSIONS.contains(&extension.as_str());
        if escaped != (mode == TemplateMode::Html) {
            return Err(ViewError::configuration(
                "views.mode",
                format!(
                    "mode {} does not match suffix '{}': '.{}' templates are {}",
                    settings.mode,
                    settings.suffix,
                    extension,
                    if escaped { "HTML-escaped" } else { "not escaped" }
                ),
            ));
        }

        Ok(Self {
            prefix,
            suffix: settings.suffix.clone(),
            encoding,
            mode,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    /// Extension without the leading dot
    pub fn extension(&self) -> &str {
        self.suffix.trim_start_matches('.')
    }

    /// Full template location for a view name, e.g. `index` →
    /// `/WEB-INF/templates/index.html`
    pub fn location(&self, name: &str) -> String {
        format!("{}/{}{}", self.prefix, name.trim_start_matches('/'), self.suffix)
    }

    /// `Content-Type` header value for rendered views
    pub fn content_type(&self) -> String {
        format!("{};charset={}", self.mode.mime_type(), self.encoding)
    }

    /// View names are relative paths below the template root
    pub fn check_name(&self, name: &str) -> ViewResult<()> {
        let invalid = |reason: &str| ViewError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = name.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(invalid("view name is empty"));
        }
        if trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid("view name must be a relative path without '.' or '..' segments"));
        }
        if trimmed.ends_with(&self.suffix) {
            return Err(invalid("view names do not include the template suffix"));
        }
        Ok(())
    }
}

type RenderFn = dyn Fn(&str, serde_json::Value) -> ViewResult<String> + Send + Sync;

/// Registry of compiled templates, keyed by logical view name
pub struct TemplateEngine {
    resolver: TemplateResolver,
    views: BTreeMap<String, Arc<RenderFn>>,
}

impl TemplateEngine {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self {
            resolver,
            views: BTreeMap::new(),
        }
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Register the askama template `T` under `name`. The model passed at
    /// render time is deserialized into `T`.
    pub fn register<T>(mut self, name: &str) -> ViewResult<Self>
    where
        T: Template + DeserializeOwned + 'static,
    {
        self.resolver.check_name(name)?;
        let name = name.trim_start_matches('/').to_string();

        if let Some(extension) = T::EXTENSION {
            if !extension.eq_ignore_ascii_case(self.resolver.extension()) {
                return Err(ViewError::SuffixMismatch {
                    name,
                    extension: extension.to_string(),
                    suffix: self.resolver.suffix().to_string(),
                });
            }
        }

        if self.views.contains_key(&name) {
            return Err(ViewError::DuplicateView { name });
        }

        let render: Arc<RenderFn> = Arc::new(|name: &str, model: serde_json::Value| {
            let view: T = serde_json::from_value(model).map_err(|e| ViewError::Model {
                name: name.to_string(),
                error: e.to_string(),
            })?;
            view.render().map_err(|e| ViewError::Render {
                name: name.to_string(),
                error: e.to_string(),
            })
        });

        debug!(
            view = %name,
            location = %self.resolver.location(&name),
            "Registered view template"
        );
        self.views.insert(name, render);
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.views.contains_key(name.trim_start_matches('/'))
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    /// Render a registered view with a JSON model
    pub fn render(&self, name: &str, model: serde_json::Value) -> ViewResult<String> {
        let key = name.trim_start_matches('/');
        match self.views.get(key) {
            Some(render) => render(key, model),
            None => Err(self.not_found(name)),
        }
    }

    fn not_found(&self, name: &str) -> ViewError {
        ViewError::NotFound {
            name: name.to_string(),
            location: self.resolver.location(name),
        }
    }
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("resolver", &self.resolver)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves view names to renderable views
#[derive(Debug, Clone)]
pub struct ViewResolver {
    engine: Arc<TemplateEngine>,
}

impl ViewResolver {
    pub fn new(engine: TemplateEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    pub fn resolve(&self, name: &str) -> ViewResult<View> {
        let resolver = self.engine.resolver();
        resolver.check_name(name)?;

        if !self.engine.contains(name) {
            return Err(self.engine.not_found(name));
        }

        Ok(View {
            name: name.trim_start_matches('/').to_string(),
            location: resolver.location(name),
            content_type: resolver.content_type(),
            engine: Arc::clone(&self.engine),
        })
    }
}

/// A resolved view, ready to render
#[derive(Clone)]
pub struct View {
    name: String,
    location: String,
    content_type: String,
    engine: Arc<TemplateEngine>,
}

impl View {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn render<M: Serialize>(&self, model: &M) -> ViewResult<String> {
        let model = serde_json::to_value(model).map_err(|e| ViewError::Model {
            name: self.name.clone(),
            error: e.to_string(),
        })?;
        self.engine.render(&self.name, model)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Build the resolver → engine → view resolver chain
pub fn build_view_pipeline<F>(settings: &ViewSettings, register: F) -> ViewResult<ViewResolver>
where
    F: FnOnce(TemplateEngine) -> ViewResult<TemplateEngine>,
{
    let resolver = TemplateResolver::from_settings(settings)?;
    let engine = register(TemplateEngine::new(resolver))?;
    Ok(ViewResolver::new(engine))
}
