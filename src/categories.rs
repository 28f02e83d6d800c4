//! Árbol de categorías de producto: datos estáticos, esquema de atributos por
//! categoría, siembra idempotente en el almacén y caché explícita del listado.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    models::{AttributeValue, CategoryInfo},
    store::CategoryStore,
};

/// Nombre de la categoría raíz del árbol. No aparece en los menús.
pub const ROOT_CATEGORY: &str = "root";

/// Nodo del árbol estático de categorías.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn leaf(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            children: Vec::new(),
        }
    }
}

/// Árbol por defecto: una raíz con dos categorías (smartphones y Laptops).
pub fn default_tree() -> CategoryNode {
    CategoryNode {
        name: Some(ROOT_CATEGORY.to_string()),
        children: vec![CategoryNode::leaf("smartphones"), CategoryNode::leaf("Laptops")],
    }
}

/// Carga el árbol desde un fichero JSON, o el árbol por defecto si no hay ruta.
pub fn load_tree(path: Option<&Path>) -> Result<CategoryNode> {
    let Some(path) = path else {
        return Ok(default_tree());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("No se pudo leer el árbol de categorías {}: {e}", path.display()))?;
    let tree: CategoryNode = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("Árbol de categorías mal formado en {}: {e}", path.display()))?;
    info!("Árbol de categorías cargado desde {}", path.display());
    Ok(tree)
}

// --- Esquema de atributos por categoría ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Number,
    Text,
}

impl AttributeKind {
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (AttributeKind::Number, AttributeValue::Number(_))
                | (AttributeKind::Text, AttributeValue::Text(_))
        )
    }
}

/// Campos no "core" de cada categoría y su tipo.
/// Los campos core (pid, nombre, descripción, categoría y precio) son comunes.
pub fn product_attributes(category: &str) -> &'static [(&'static str, AttributeKind)] {
    match category {
        "smartphones" => &[("brand", AttributeKind::Text)],
        "Laptops" => &[
            ("size", AttributeKind::Number),
            ("brand", AttributeKind::Text),
            ("laptop_type", AttributeKind::Text),
        ],
        _ => &[],
    }
}

// --- Siembra del árbol ---

/// Crea las categorías a partir del árbol estático si el almacén está vacío.
///
/// Si ya existe alguna categoría no hace nada. Si no, recorre el árbol en
/// profundidad creando cada nodo con un enlace a su padre inmediato. Un nodo
/// sin nombre se omite (junto con su subárbol) y se continúa con sus hermanos.
///
/// Devuelve el número de categorías creadas.
pub async fn build_categories<S>(store: &S, tree: &CategoryNode) -> Result<usize>
where
    S: CategoryStore + ?Sized,
{
    if store.has_categories().await? {
        debug!("Categorías ya presentes en el almacén; no se reconstruyen.");
        return Ok(0);
    }

    let mut created = 0;
    let mut pending: Vec<(&CategoryNode, Option<String>)> = vec![(tree, None)];

    while let Some((node, parent)) = pending.pop() {
        let name = match node.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!(
                    "Categoría sin nombre bajo {:?}; se omite junto con {} hijos.",
                    parent,
                    node.children.len()
                );
                continue;
            }
        };

        store.create_category(&name, parent.as_deref()).await?;
        created += 1;

        // En orden inverso para que la pila respete el orden de los hijos.
        for child in node.children.iter().rev() {
            pending.push((child, Some(name.clone())));
        }
    }

    info!("Árbol de categorías creado ({created} categorías).");
    Ok(created)
}

// --- Caché del listado de categorías ---

/// Caché explícita de los pares (id, nombre) de categorías.
/// Se rellena en la primera lectura y se invalida tras cada ingesta.
#[derive(Debug, Default)]
pub struct CategoryCache {
    info: RwLock<Option<Vec<CategoryInfo>>>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load<S>(&self, store: &S) -> Result<Vec<CategoryInfo>>
    where
        S: CategoryStore + ?Sized,
    {
        if let Some(info) = self.info.read().await.as_ref() {
            return Ok(info.clone());
        }

        let mut guard = self.info.write().await;
        if let Some(info) = guard.as_ref() {
            return Ok(info.clone());
        }

        let info: Vec<CategoryInfo> = store
            .list_categories()
            .await?
            .into_iter()
            .filter(|c| c.name != ROOT_CATEGORY)
            .map(|c| CategoryInfo {
                id: c.name.clone(),
                name: c.name,
            })
            .collect();
        *guard = Some(info.clone());
        Ok(info)
    }

    pub async fn invalidate(&self) {
        *self.info.write().await = None;
    }
}
