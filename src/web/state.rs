//! # Web Application State
//!
//! Shared state handed to every handler: the singletons built by the
//! bootstrap, behind one `Arc`.

use crate::bootstrap::ApplicationContext;
use crate::persistence::PersistenceContext;
use crate::views::ViewResolver;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AppState {
    pub context: Arc<ApplicationContext>,
}

impl AppState {
    pub fn new(context: Arc<ApplicationContext>) -> Self {
        Self { context }
    }

    pub fn views(&self) -> &ViewResolver {
        &self.context.views
    }

    pub fn persistence(&self) -> PersistenceContext {
        self.context.persistence_context()
    }

    pub fn environment(&self) -> &str {
        self.context.config.environment()
    }
}
