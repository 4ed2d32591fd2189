//! Built-in views shipped with the server.

use super::{TemplateEngine, ViewResult};
use askama::Template;
use serde::{Deserialize, Serialize};

/// Landing page
#[derive(Template, Debug, Clone, Serialize, Deserialize)]
#[template(path = "index.html")]
pub struct IndexView {
    pub title: String,
    pub message: String,
}

/// Rendered for failed page requests
#[derive(Template, Debug, Clone, Serialize, Deserialize)]
#[template(path = "error.html")]
pub struct ErrorView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

pub fn register_builtin_views(engine: TemplateEngine) -> ViewResult<TemplateEngine> {
    engine
        .register::<IndexView>("index")?
        .register::<ErrorView>("error")
}
