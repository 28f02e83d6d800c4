//! Ingesta de los ficheros de datos de ejemplo: cada producto genera (o
//! actualiza) su documento indexado y su registro "core"; cada tienda se indexa
//! con su localización.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    categories::product_attributes,
    models::{AttributeValue, ProductInput, ProductRecord, SampleData, SearchDocument},
    store::Catalog,
};

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub products_created: usize,
    pub products_updated: usize,
    pub products_skipped: usize,
    pub stores_indexed: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} productos creados, {} actualizados, {} omitidos y {} tiendas indexadas.",
            self.files_scanned,
            self.files_ingested,
            self.files_skipped,
            self.products_created,
            self.products_updated,
            self.products_skipped,
            self.stores_indexed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOutcome {
    Created,
    Updated,
}

/// Ficheros `.json` del directorio, en orden de nombre: así los ficheros
/// `*_update.json` se aplican después de los originales.
pub fn sample_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(std::ffi::OsStr::to_str)
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    files
}

/// Recorre el directorio de datos de ejemplo e ingiere cada fichero.
pub async fn ingest_directory<C>(
    catalog: &C,
    root: &Path,
    status_arc: Arc<Mutex<Status>>,
) -> Result<IngestionSummary>
where
    C: Catalog + ?Sized,
{
    if !root.is_dir() {
        return Err(anyhow!(
            "La ruta no es un directorio: {}",
            root.display()
        ));
    }

    let mut summary = IngestionSummary::default();
    let files = sample_files(root);
    let total_files = files.len().max(1) as f32;

    for (index, path) in files.iter().enumerate() {
        summary.files_scanned += 1;
        let filename_str = path.file_name().unwrap_or_default().to_string_lossy();
        let progress = (index + 1) as f32 / total_files;

        {
            let mut status = status_arc.lock().unwrap();
            status.message = format!(
                "[{}/{}] Procesando: {}...",
                index + 1,
                files.len(),
                filename_str
            );
            status.progress = progress;
        }

        let data = match read_sample_file(path) {
            Ok(data) => data,
            Err(err) => {
                summary.files_skipped += 1;
                error!("Error leyendo {}: {err}", path.display());
                let mut status = status_arc.lock().unwrap();
                status.message = format!("ERROR en {}: {}", path.display(), err);
                continue;
            }
        };

        // Un fallo al escribir sólo descarta este fichero; lo ya escrito se queda.
        if let Err(err) = ingest_sample_data(catalog, &data, &mut summary).await {
            summary.files_skipped += 1;
            error!("Error ingiriendo {}: {err}", path.display());
            let mut status = status_arc.lock().unwrap();
            status.message = format!("ERROR en {}: {}", path.display(), err);
            continue;
        }
        summary.files_ingested += 1;
        info!(
            "Ingerido {} ({} productos, {} tiendas).",
            path.display(),
            data.products.len(),
            data.stores.len()
        );
    }

    Ok(summary)
}

fn read_sample_file(path: &Path) -> Result<SampleData> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Ingiere el contenido de un fichero ya leído.
pub async fn ingest_sample_data<C>(
    catalog: &C,
    data: &SampleData,
    summary: &mut IngestionSummary,
) -> Result<()>
where
    C: Catalog + ?Sized,
{
    for product in &data.products {
        match ingest_product(catalog, product).await? {
            Some(ProductOutcome::Created) => summary.products_created += 1,
            Some(ProductOutcome::Updated) => summary.products_updated += 1,
            None => summary.products_skipped += 1,
        }
    }
    for store in &data.stores {
        if store.store_id.trim().is_empty() {
            warn!("Tienda sin identificador ('{}'); se omite.", store.name);
            continue;
        }
        catalog.index_store(store).await?;
        summary.stores_indexed += 1;
    }
    Ok(())
}

/// Crea o actualiza un producto. Devuelve `None` si los datos no son válidos.
pub async fn ingest_product<C>(catalog: &C, input: &ProductInput) -> Result<Option<ProductOutcome>>
where
    C: Catalog + ?Sized,
{
    let pid = input.pid.trim();
    if pid.is_empty() {
        warn!("Producto sin pid ('{}'); se omite.", input.name);
        return Ok(None);
    }
    if !input.price.is_finite() || input.price < 0.0 {
        warn!("Precio no válido para {pid}: {}; se omite.", input.price);
        return Ok(None);
    }
    if !catalog.category_exists(&input.category).await? {
        warn!("Categoría desconocida '{}' para {pid}; se omite.", input.category);
        return Ok(None);
    }
    let Some(attributes) = check_attributes(pid, &input.category, &input.attributes) else {
        return Ok(None);
    };

    let existing = catalog.get_product(pid).await?;
    let doc_id = existing
        .as_ref()
        .map(|p| p.doc_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let brand = match attributes.get("brand") {
        Some(AttributeValue::Text(brand)) => brand.clone(),
        _ => String::new(),
    };

    let doc = SearchDocument {
        doc_id: doc_id.clone(),
        pid: pid.to_string(),
        name: input.name.clone(),
        description: input.description.clone(),
        category: input.category.clone(),
        price: input.price,
        brand,
        attributes,
    };
    catalog.index_product(&doc).await?;

    let record = ProductRecord {
        pid: pid.to_string(),
        price: input.price,
        category: input.category.clone(),
        active: existing.as_ref().map(|p| p.active).unwrap_or(true),
        doc_id,
        updated_at: Utc::now().to_rfc3339(),
    };
    catalog.put_product(&record).await?;

    Ok(Some(if existing.is_some() {
        ProductOutcome::Updated
    } else {
        ProductOutcome::Created
    }))
}

/// Valida los atributos específicos de la categoría. Los que no están en el
/// esquema se descartan; uno con tipo incorrecto invalida el producto.
fn check_attributes(
    pid: &str,
    category: &str,
    attributes: &BTreeMap<String, AttributeValue>,
) -> Option<BTreeMap<String, AttributeValue>> {
    let schema = product_attributes(category);
    let mut accepted = BTreeMap::new();
    for (name, value) in attributes {
        match schema.iter().find(|(field, _)| field == name) {
            Some((_, kind)) if kind.accepts(value) => {
                accepted.insert(name.clone(), value.clone());
            }
            Some((_, kind)) => {
                warn!("Atributo '{name}' de {pid} no es de tipo {kind:?}; se omite el producto.");
                return None;
            }
            None => debug!("Atributo '{name}' no definido para '{category}'; se descarta."),
        }
    }
    Some(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        categories::{build_categories, default_tree},
        search_index::SearchBackend,
        store::{memory::MemoryCatalog, ProductStore},
    };

    async fn seeded() -> MemoryCatalog {
        let catalog = MemoryCatalog::default();
        build_categories(&catalog, &default_tree()).await.unwrap();
        catalog
    }

    fn laptop(pid: &str, price: f64) -> ProductInput {
        serde_json::from_value(serde_json::json!({
            "pid": pid,
            "name": "ThinkBook 14",
            "description": "Portátil ligero",
            "category": "Laptops",
            "price": price,
            "attributes": {"size": 14.0, "brand": "Lenovo", "laptop_type": "ultrabook", "color": "grey"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn creates_then_updates_keeping_doc_id() {
        let catalog = seeded().await;
        assert_eq!(
            ingest_product(&catalog, &laptop("l1", 900.0)).await.unwrap(),
            Some(ProductOutcome::Created)
        );
        let first = catalog.get_product("l1").await.unwrap().unwrap();

        assert_eq!(
            ingest_product(&catalog, &laptop("l1", 850.0)).await.unwrap(),
            Some(ProductOutcome::Updated)
        );
        let second = catalog.get_product("l1").await.unwrap().unwrap();
        assert_eq!(second.doc_id, first.doc_id);
        assert_eq!(second.price, 850.0);
        assert_eq!(catalog.document_count(), 1);

        let doc = catalog.product_document("l1").await.unwrap().unwrap();
        assert_eq!(doc.brand, "Lenovo");
        assert!(!doc.attributes.contains_key("color"));
    }

    #[tokio::test]
    async fn invalid_products_are_skipped() {
        let catalog = seeded().await;
        assert_eq!(ingest_product(&catalog, &laptop("", 10.0)).await.unwrap(), None);
        assert_eq!(ingest_product(&catalog, &laptop("neg", -1.0)).await.unwrap(), None);

        let mut wrong_cat = laptop("x", 10.0);
        wrong_cat.category = "Tablets".into();
        assert_eq!(ingest_product(&catalog, &wrong_cat).await.unwrap(), None);

        let mut wrong_type = laptop("y", 10.0);
        wrong_type
            .attributes
            .insert("size".into(), AttributeValue::Text("big".into()));
        assert_eq!(ingest_product(&catalog, &wrong_type).await.unwrap(), None);

        assert_eq!(catalog.document_count(), 0);
    }

    #[tokio::test]
    async fn ingests_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("sample_data_laptop.json"),
            r#"{"products": [{"pid": "l1", "name": "A", "category": "Laptops", "price": 100}],
                "stores": [{"store_id": "s1", "name": "Centro", "address": "Calle 1", "latitude": 40.4, "longitude": -3.7}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("sample_data_laptop_update.json"),
            r#"{"products": [{"pid": "l1", "name": "A", "category": "Laptops", "price": 80}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = seeded().await;
        let status = Arc::new(Mutex::new(Status::default()));
        let summary = ingest_directory(&catalog, dir.path(), status.clone())
            .await
            .unwrap();

        assert_eq!(summary.files_scanned, 3);
        assert_eq!(summary.files_ingested, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.products_created, 1);
        assert_eq!(summary.products_updated, 1);
        assert_eq!(summary.stores_indexed, 1);
        assert_eq!(catalog.get_product("l1").await.unwrap().unwrap().price, 80.0);
        assert!((status.lock().unwrap().progress - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failed_store_write_skips_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a_stores.json"),
            r#"{"stores": [{"store_id": "s1", "name": "Centro", "address": "Calle 1", "latitude": 40.4, "longitude": -3.7}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b_laptops.json"),
            r#"{"products": [{"pid": "l1", "name": "A", "category": "Laptops", "price": 100}]}"#,
        )
        .unwrap();

        let catalog = seeded().await;
        catalog
            .fail_store_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let status = Arc::new(Mutex::new(Status::default()));
        let summary = ingest_directory(&catalog, dir.path(), status)
            .await
            .unwrap();

        assert_eq!(summary.files_scanned, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_ingested, 1);
        assert_eq!(summary.stores_indexed, 0);
        assert_eq!(summary.products_created, 1);
        assert!(catalog.get_product("l1").await.unwrap().is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let catalog = MemoryCatalog::default();
        let status = Arc::new(Mutex::new(Status::default()));
        let result = tokio_test::block_on(ingest_directory(
            &catalog,
            Path::new("/definitely/not/here"),
            status,
        ));
        assert!(result.is_err());
    }
}
