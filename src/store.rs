//! Interfaces del almacén de registros (categorías y productos).
//!
//! La implementación real sobre Neo4j está en `neo4j_client`; los tests usan
//! `memory::MemoryCatalog`.

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    models::{CategoryRecord, ProductRecord},
    search_index::SearchBackend,
};

#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// ¿Hay al menos una categoría en el almacén?
    async fn has_categories(&self) -> Result<bool>;

    /// Crea la categoría si no existe, enlazada a su padre.
    async fn create_category(&self, name: &str, parent: Option<&str>) -> Result<()>;

    async fn category_exists(&self, name: &str) -> Result<bool>;

    async fn list_categories(&self) -> Result<Vec<CategoryRecord>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, pid: &str) -> Result<Option<ProductRecord>>;

    /// Crea o actualiza el registro "core" de un producto (clave: pid).
    async fn put_product(&self, record: &ProductRecord) -> Result<()>;
}

/// Registros + buscador: todo lo que usan los handlers y la ingesta.
pub trait Catalog: CategoryStore + ProductStore + SearchBackend {}

impl<T> Catalog for T where T: CategoryStore + ProductStore + SearchBackend + ?Sized {}

#[cfg(test)]
pub mod memory {
    //! Almacén y buscador en memoria para los tests.

    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{CategoryStore, ProductStore};
    use crate::{
        models::{CategoryRecord, ProductRecord, SearchDocument, StoreDocument},
        query::{QuerySpec, SortDirection, SortField, SortSpec},
        search_index::{query_terms, GeoQuery, ProductHit, SearchBackend, SearchPage, StoreHit},
    };

    #[derive(Default)]
    pub struct MemoryCatalog {
        categories: Mutex<Vec<CategoryRecord>>,
        products: Mutex<BTreeMap<String, ProductRecord>>,
        documents: Mutex<BTreeMap<String, SearchDocument>>,
        stores: Mutex<Vec<StoreDocument>>,
        pub fail_search: AtomicBool,
        pub fail_store_writes: AtomicBool,
    }

    impl MemoryCatalog {
        pub fn failing() -> Self {
            let catalog = Self::default();
            catalog.fail_search.store(true, Ordering::SeqCst);
            catalog
        }

        pub fn document_count(&self) -> usize {
            self.documents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CategoryStore for MemoryCatalog {
        async fn has_categories(&self) -> Result<bool> {
            Ok(!self.categories.lock().unwrap().is_empty())
        }

        async fn create_category(&self, name: &str, parent: Option<&str>) -> Result<()> {
            let mut cats = self.categories.lock().unwrap();
            if !cats.iter().any(|c| c.name == name) {
                cats.push(CategoryRecord {
                    name: name.to_string(),
                    parent: parent.map(str::to_string),
                });
            }
            Ok(())
        }

        async fn category_exists(&self, name: &str) -> Result<bool> {
            Ok(self.categories.lock().unwrap().iter().any(|c| c.name == name))
        }

        async fn list_categories(&self) -> Result<Vec<CategoryRecord>> {
            Ok(self.categories.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl ProductStore for MemoryCatalog {
        async fn get_product(&self, pid: &str) -> Result<Option<ProductRecord>> {
            Ok(self.products.lock().unwrap().get(pid).cloned())
        }

        async fn put_product(&self, record: &ProductRecord) -> Result<()> {
            self.products
                .lock()
                .unwrap()
                .insert(record.pid.clone(), record.clone());
            Ok(())
        }
    }

    /// Distancia en metros sobre la esfera terrestre.
    fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
        let dp = (lat2 - lat1).to_radians();
        let dl = (lon2 - lon1).to_radians();
        let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    /// Búsqueda ingenua: el filtro `category:"X"` se respeta y el resto de
    /// términos deben aparecer en el nombre o la descripción.
    fn matches(doc: &SearchDocument, query: &str) -> bool {
        let (text, category) = match query.find("category:\"") {
            Some(pos) => {
                let rest = &query[pos + "category:\"".len()..];
                let end = rest.find('"').unwrap_or(rest.len());
                (&query[..pos], Some(&rest[..end]))
            }
            None => (query, None),
        };
        if let Some(cat) = category {
            if doc.category != cat {
                return false;
            }
        }
        let haystack = format!("{} {}", doc.name, doc.description).to_lowercase();
        text.split_whitespace()
            .all(|term| haystack.contains(&term.to_lowercase()))
    }

    fn compare(a: &SearchDocument, b: &SearchDocument, field: SortField) -> std::cmp::Ordering {
        match field {
            SortField::Price => a.price.total_cmp(&b.price),
            SortField::Name => a.name.cmp(&b.name),
            SortField::Brand => a.brand.cmp(&b.brand),
        }
    }

    #[async_trait]
    impl SearchBackend for MemoryCatalog {
        async fn search_products(&self, spec: &QuerySpec) -> Result<SearchPage> {
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(anyhow!("buscador no disponible"));
            }
            let mut found: Vec<SearchDocument> = self
                .documents
                .lock()
                .unwrap()
                .values()
                .filter(|d| matches(d, &spec.query_string))
                .cloned()
                .collect();
            if let SortSpec::Fields(exprs) = &spec.sort {
                found.sort_by(|a, b| {
                    exprs.iter().fold(std::cmp::Ordering::Equal, |acc, e| {
                        acc.then_with(|| {
                            let ord = compare(a, b, e.field);
                            match e.direction {
                                SortDirection::Ascending => ord,
                                SortDirection::Descending => ord.reverse(),
                            }
                        })
                    })
                });
            }
            let number_found = found.len();
            let terms = query_terms(&spec.query_string);
            let documents: Vec<ProductHit> = found
                .into_iter()
                .skip(spec.offset)
                .take(spec.limit)
                .map(|doc| ProductHit::from_document(doc, spec, &terms))
                .collect();
            Ok(SearchPage {
                returned_count: documents.len(),
                number_found,
                documents,
            })
        }

        async fn product_document(&self, pid: &str) -> Result<Option<SearchDocument>> {
            Ok(self
                .documents
                .lock()
                .unwrap()
                .values()
                .find(|d| d.pid == pid)
                .cloned())
        }

        async fn index_product(&self, doc: &SearchDocument) -> Result<()> {
            self.documents
                .lock()
                .unwrap()
                .insert(doc.doc_id.clone(), doc.clone());
            Ok(())
        }

        async fn search_stores(&self, query: &GeoQuery) -> Result<Vec<StoreHit>> {
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(anyhow!("buscador no disponible"));
            }
            let text = query.text.to_lowercase();
            let mut hits: Vec<StoreHit> = self
                .stores
                .lock()
                .unwrap()
                .iter()
                .filter(|s| {
                    text.is_empty()
                        || s.name.to_lowercase().contains(&text)
                        || s.address.to_lowercase().contains(&text)
                })
                .map(|s| StoreHit {
                    distance_m: haversine_m(
                        query.latitude,
                        query.longitude,
                        s.latitude,
                        s.longitude,
                    ),
                    store: s.clone(),
                })
                .filter(|h| h.distance_m < query.radius_m)
                .collect();
            hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
            Ok(hits)
        }

        async fn index_store(&self, store: &StoreDocument) -> Result<()> {
            if self.fail_store_writes.load(Ordering::SeqCst) {
                return Err(anyhow!("índice de tiendas no disponible"));
            }
            let mut stores = self.stores.lock().unwrap();
            stores.retain(|s| s.store_id != store.store_id);
            stores.push(store.clone());
            Ok(())
        }
    }
}
