use std::sync::Arc;
use crate::application::services::MonitorService;

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    pub monitor: Arc<MonitorService>,
}
