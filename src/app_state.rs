use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{categories::CategoryCache, config::AppConfig, neo4j_client::Neo4jCatalog};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<Neo4jCatalog>,
    pub category_cache: Arc<CategoryCache>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado de la ingesta de datos de ejemplo.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
