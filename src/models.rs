//! Modelos de dominio (categorías, productos, documentos indexados y tiendas).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Representa un nodo (:Category) en Neo4j.
/// El nombre es la clave; el padre se guarda como relación CHILD_OF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRecord {
    pub name: String,
    pub parent: Option<String>,
}

/// Par (id, nombre) usado para poblar los menús de categorías.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
}

/// Representa un nodo (:Product) en Neo4j.
/// Sólo contiene los campos "core"; el resto vive en el documento indexado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub pid: String,
    pub price: f64,
    pub category: String,
    pub active: bool,
    pub doc_id: String,
    pub updated_at: String,
}

/// Valor de un atributo específico de categoría.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

/// Representa un nodo (:ProductDocument): el documento rico que indexa el
/// buscador full-text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    pub doc_id: String,
    pub pid: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub brand: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Representa un nodo (:Store) con su localización.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub store_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Producto tal y como aparece en los ficheros de datos de ejemplo.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub pid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Contenido de un fichero de datos de ejemplo.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleData {
    #[serde(default)]
    pub products: Vec<ProductInput>,
    #[serde(default)]
    pub stores: Vec<StoreDocument>,
}
