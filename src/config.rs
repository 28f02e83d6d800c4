//! Carga y gestión de configuración de la aplicación (Neo4j + búsqueda).

use std::env;
use std::path::PathBuf;
use anyhow::{anyhow, Result};
use tracing::error;

/// Número de resultados por página si `DOC_LIMIT` no está bien definido.
pub const DEFAULT_DOC_LIMIT: usize = 3;
/// Offset máximo que se permite en la paginación.
pub const DEFAULT_OFFSET_LIMIT: usize = 1000;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,

    /// Nombre del índice full-text de productos.
    pub product_index_name: String,
    /// Nombre del índice de tiendas (puntos geográficos).
    pub store_index_name: String,
    pub doc_limit: usize,
    pub offset_limit: usize,

    pub sample_data_dir: PathBuf,
    pub category_tree_path: Option<PathBuf>,
    pub frontend_dir: PathBuf,
    pub open_browser: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let neo4j_uri = env::var("NEO4J_URI")
            .map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?;
        let neo4j_user = env::var("NEO4J_USER")
            .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?;
        let neo4j_password = env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let product_index_name =
            env::var("PRODUCT_INDEX_NAME").unwrap_or_else(|_| "productsearch1".to_string());
        validate_index_name(&product_index_name)?;
        let store_index_name =
            env::var("STORE_INDEX_NAME").unwrap_or_else(|_| "stores1".to_string());
        validate_index_name(&store_index_name)?;

        let doc_limit = parse_doc_limit(env::var("DOC_LIMIT").ok().as_deref());
        let offset_limit = env::var("OFFSET_LIMIT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_OFFSET_LIMIT);

        let sample_data_dir =
            PathBuf::from(env::var("SAMPLE_DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let category_tree_path = env::var("CATEGORY_TREE_PATH").ok().map(PathBuf::from);
        let frontend_dir =
            PathBuf::from(env::var("FRONTEND_DIR").unwrap_or_else(|_| "frontend".to_string()));
        let open_browser = env::var("OPEN_BROWSER")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            product_index_name,
            store_index_name,
            doc_limit,
            offset_limit,
            sample_data_dir,
            category_tree_path,
            frontend_dir,
            open_browser,
        })
    }
}

/// Si el límite de documentos no está bien definido se usa el valor por defecto.
pub fn parse_doc_limit(raw: Option<&str>) -> usize {
    match raw {
        None => DEFAULT_DOC_LIMIT,
        Some(v) => match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                error!("DOC_LIMIT mal definido ('{v}'); usando el valor por defecto.");
                DEFAULT_DOC_LIMIT
            }
        },
    }
}

/// Un nombre de índice debe ser ASCII imprimible, sin espacios y sin empezar por '!'.
/// Además sólo se admiten caracteres que Neo4j acepta sin comillas.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('!') {
        return Err(anyhow!("Nombre de índice no válido: '{name}'"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!("Nombre de índice no válido: '{name}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_limit_defaults_when_missing_or_invalid() {
        assert_eq!(parse_doc_limit(None), DEFAULT_DOC_LIMIT);
        assert_eq!(parse_doc_limit(Some("abc")), DEFAULT_DOC_LIMIT);
        assert_eq!(parse_doc_limit(Some("0")), DEFAULT_DOC_LIMIT);
        assert_eq!(parse_doc_limit(Some(" 10 ")), 10);
    }

    #[test]
    fn index_names_are_validated() {
        assert!(validate_index_name("productsearch1").is_ok());
        assert!(validate_index_name("stores_1").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("!hidden").is_err());
        assert!(validate_index_name("with space").is_err());
    }
}
