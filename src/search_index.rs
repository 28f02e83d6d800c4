//! Integración con Neo4j como servicio de búsqueda.
//!
//! - Productos: índice FULLTEXT sobre `(:ProductDocument)` (sintaxis Lucene).
//! - Tiendas: `point.distance` sobre `(:Store {location})` con índice POINT.
//!
//! El ranking, la tokenización y el cálculo de distancias los hace Neo4j; aquí
//! sólo se traduce un `QuerySpec` a Cypher y se leen los resultados.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Query};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    models::{AttributeValue, SearchDocument, StoreDocument},
    neo4j_client::Neo4jCatalog,
    query::{QuerySpec, SortDirection, SortSpec, DESCRIPTION},
};

/// Longitud máxima (en caracteres) de un snippet.
pub const SNIPPET_CHARS: usize = 160;

/// Un documento devuelto por el buscador de productos.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductHit {
    pub pid: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    /// Expresiones calculadas (snippets y campos derivados) por nombre.
    pub expressions: BTreeMap<String, AttributeValue>,
}

impl ProductHit {
    /// Construye el resultado a partir de un documento completo, calculando las
    /// expresiones que pide la consulta.
    pub fn from_document(doc: SearchDocument, spec: &QuerySpec, terms: &[String]) -> Self {
        let mut expressions = BTreeMap::new();
        for expr in &spec.returned_expressions {
            let source = match expr.source_field {
                "price" => doc.price,
                _ => continue,
            };
            expressions.insert(expr.name.to_string(), AttributeValue::Number(source * expr.factor));
        }
        if spec.snippeted_fields.contains(&DESCRIPTION) {
            expressions.insert(
                DESCRIPTION.to_string(),
                AttributeValue::Text(snippet(&doc.description, terms, SNIPPET_CHARS)),
            );
        }
        Self {
            pid: doc.pid,
            name: doc.name,
            description: doc.description,
            category: doc.category,
            price: doc.price,
            expressions,
        }
    }

    pub fn text_expression(&self, name: &str) -> Option<&str> {
        match self.expressions.get(name) {
            Some(AttributeValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn number_expression(&self, name: &str) -> Option<f64> {
        match self.expressions.get(name) {
            Some(AttributeValue::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Página de resultados de una búsqueda de productos.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    pub documents: Vec<ProductHit>,
    pub returned_count: usize,
    pub number_found: usize,
}

/// Consulta de proximidad geográfica sobre tiendas.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoQuery {
    pub text: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreHit {
    pub store: StoreDocument,
    pub distance_m: f64,
}

/// Servicio de búsqueda externo (productos y tiendas).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search_products(&self, spec: &QuerySpec) -> Result<SearchPage>;

    async fn product_document(&self, pid: &str) -> Result<Option<SearchDocument>>;

    async fn index_product(&self, doc: &SearchDocument) -> Result<()>;

    /// Tiendas dentro del radio, ordenadas por distancia ascendente.
    async fn search_stores(&self, query: &GeoQuery) -> Result<Vec<StoreHit>>;

    async fn index_store(&self, store: &StoreDocument) -> Result<()>;
}

// --- Traducción de QuerySpec a Cypher ---

/// Términos de texto libre de la consulta, sin prefijos de campo ni comillas.
pub fn query_terms(query_string: &str) -> Vec<String> {
    query_string
        .split_whitespace()
        .filter(|t| !t.contains(':'))
        .map(|t| t.trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Cláusula inicial: full-text si hay consulta, todos los documentos si no.
fn match_clause(spec: &QuerySpec) -> &'static str {
    if spec.query_string.is_empty() {
        "MATCH (d:ProductDocument) WITH d, 0.0 AS score"
    } else {
        "CALL db.index.fulltext.queryNodes($index_name, $query_string) YIELD node AS d, score"
    }
}

fn order_clause(sort: &SortSpec) -> String {
    match sort {
        SortSpec::MatchScore => "score DESC".to_string(),
        SortSpec::Fields(exprs) => exprs
            .iter()
            .map(|e| {
                let dir = match e.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                format!("d.{} {dir}", e.field.field_name())
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Cypher de la página de resultados.
pub fn product_page_cypher(spec: &QuerySpec) -> String {
    let mut projection: Vec<String> = spec
        .returned_fields
        .iter()
        .map(|f| format!("d.{f} AS {f}"))
        .collect();
    for (i, expr) in spec.returned_expressions.iter().enumerate() {
        projection.push(format!("d.{} * $expr_{i} AS {}", expr.source_field, expr.name));
    }
    format!(
        "{}\nRETURN {}\nORDER BY {}\nSKIP $offset LIMIT $limit",
        match_clause(spec),
        projection.join(", "),
        order_clause(&spec.sort)
    )
}

/// Cypher del número total de coincidencias.
pub fn product_count_cypher(spec: &QuerySpec) -> String {
    format!("{}\nRETURN count(d) AS total", match_clause(spec))
}

// --- Snippets ---

/// Extracto de `text` alrededor del primer término encontrado (sin distinguir
/// mayúsculas). Sin coincidencias, devuelve el principio del texto.
pub fn snippet(text: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let lower: Vec<char> = chars.iter().map(|c| c.to_lowercase().next().unwrap_or(*c)).collect();

    let hit = terms.iter().find_map(|term| {
        let needle: Vec<char> = term.chars().map(|c| c.to_lowercase().next().unwrap_or(c)).collect();
        if needle.is_empty() || needle.len() > lower.len() {
            return None;
        }
        lower.windows(needle.len()).position(|w| w == needle.as_slice())
    });

    let start = hit
        .map(|pos| pos.saturating_sub(max_chars / 4))
        .unwrap_or(0)
        .min(chars.len() - max_chars);
    let end = start + max_chars;

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

// --- Implementación sobre Neo4j ---

/// Campo obligatorio de una fila de Neo4j.
macro_rules! required {
    ($row:expr, $key:literal) => {
        $row.get($key)
            .ok_or_else(|| anyhow!(concat!("Falta campo '", $key, "' en resultado de Neo4j")))
    };
}

/// Los parámetros enteros de Bolt son i64; un valor mayor se satura.
pub fn bolt_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn parse_attributes(raw: Option<String>, pid: &str) -> BTreeMap<String, AttributeValue> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return BTreeMap::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Atributos ilegibles para el producto {pid}: {e}");
        BTreeMap::new()
    })
}

impl Neo4jCatalog {
    fn product_query(&self, cypher: &str, spec: &QuerySpec) -> Query {
        let mut q = query(cypher)
            .param("index_name", self.product_index.clone())
            .param("query_string", spec.query_string.clone())
            .param("offset", bolt_int(spec.offset))
            .param("limit", bolt_int(spec.limit));
        for (i, expr) in spec.returned_expressions.iter().enumerate() {
            q = q.param(&format!("expr_{i}"), expr.factor);
        }
        q
    }

    async fn fetch_page(&self, spec: &QuerySpec) -> Result<Vec<ProductHit>> {
        let cypher = product_page_cypher(spec);
        let mut cursor = self.graph.execute(self.product_query(&cypher, spec)).await?;
        let terms = query_terms(&spec.query_string);

        let mut hits = Vec::new();
        while let Some(row) = cursor.next().await? {
            let doc = SearchDocument {
                doc_id: String::new(),
                pid: required!(row, "pid")?,
                name: row.get("name").unwrap_or_default(),
                description: row.get("description").unwrap_or_default(),
                category: row.get("category").unwrap_or_default(),
                price: row.get("price").unwrap_or_default(),
                brand: String::new(),
                attributes: BTreeMap::new(),
            };
            let mut hit = ProductHit::from_document(doc, spec, &terms);
            // Las expresiones numéricas ya vienen calculadas por Neo4j.
            for expr in &spec.returned_expressions {
                if let Some(value) = row.get::<f64>(expr.name) {
                    hit.expressions
                        .insert(expr.name.to_string(), AttributeValue::Number(value));
                }
            }
            hits.push(hit);
        }
        Ok(hits)
    }

    async fn fetch_count(&self, spec: &QuerySpec) -> Result<usize> {
        let cypher = product_count_cypher(spec);
        let mut cursor = self.graph.execute(self.product_query(&cypher, spec)).await?;
        let total: i64 = match cursor.next().await? {
            Some(row) => required!(row, "total")?,
            None => 0,
        };
        Ok(total.max(0) as usize)
    }
}

#[async_trait]
impl SearchBackend for Neo4jCatalog {
    async fn search_products(&self, spec: &QuerySpec) -> Result<SearchPage> {
        debug!("Búsqueda de productos: {:?}", spec.query_string);
        let (documents, number_found) =
            futures::try_join!(self.fetch_page(spec), self.fetch_count(spec))?;
        Ok(SearchPage {
            returned_count: documents.len(),
            number_found,
            documents,
        })
    }

    async fn product_document(&self, pid: &str) -> Result<Option<SearchDocument>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (d:ProductDocument {pid: $pid})
                     RETURN d.doc_id AS doc_id, d.name AS name, d.description AS description,
                            d.category AS category, d.price AS price, d.brand AS brand,
                            d.attributes AS attributes
                     LIMIT 1",
                )
                .param("pid", pid),
            )
            .await?;

        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };
        Ok(Some(SearchDocument {
            doc_id: required!(row, "doc_id")?,
            pid: pid.to_string(),
            name: row.get("name").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            category: row.get("category").unwrap_or_default(),
            price: row.get("price").unwrap_or_default(),
            brand: row.get("brand").unwrap_or_default(),
            attributes: parse_attributes(row.get("attributes"), pid),
        }))
    }

    async fn index_product(&self, doc: &SearchDocument) -> Result<()> {
        let attributes = serde_json::to_string(&doc.attributes)?;
        self.graph
            .run(
                query(
                    "MERGE (d:ProductDocument {doc_id: $doc_id})
                     SET d.pid = $pid, d.name = $name, d.description = $description,
                         d.category = $category, d.price = $price, d.brand = $brand,
                         d.attributes = $attributes",
                )
                .param("doc_id", doc.doc_id.clone())
                .param("pid", doc.pid.clone())
                .param("name", doc.name.clone())
                .param("description", doc.description.clone())
                .param("category", doc.category.clone())
                .param("price", doc.price)
                .param("brand", doc.brand.clone())
                .param("attributes", attributes),
            )
            .await?;
        Ok(())
    }

    async fn search_stores(&self, geo: &GeoQuery) -> Result<Vec<StoreHit>> {
        debug!(
            "Búsqueda de tiendas (índice '{}') en ({}, {}), radio {} m",
            self.store_index, geo.latitude, geo.longitude, geo.radius_m
        );
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (s:Store)
                     WITH s, point.distance(s.location, point({latitude: $lat, longitude: $lon})) AS dist
                     WHERE dist < $radius
                       AND ($text = '' OR toLower(s.name) CONTAINS toLower($text)
                            OR toLower(s.address) CONTAINS toLower($text))
                     RETURN s.store_id AS store_id, s.name AS name, s.address AS address,
                            s.location.latitude AS lat, s.location.longitude AS lon, dist
                     ORDER BY dist ASC",
                )
                .param("lat", geo.latitude)
                .param("lon", geo.longitude)
                .param("radius", geo.radius_m)
                .param("text", geo.text.trim()),
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = cursor.next().await? {
            hits.push(StoreHit {
                store: StoreDocument {
                    store_id: required!(row, "store_id")?,
                    name: row.get("name").unwrap_or_default(),
                    address: row.get("address").unwrap_or_default(),
                    latitude: required!(row, "lat")?,
                    longitude: required!(row, "lon")?,
                },
                distance_m: required!(row, "dist")?,
            });
        }
        Ok(hits)
    }

    async fn index_store(&self, store: &StoreDocument) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (s:Store {store_id: $store_id})
                     SET s.name = $name, s.address = $address,
                         s.location = point({latitude: $lat, longitude: $lon})",
                )
                .param("store_id", store.store_id.clone())
                .param("name", store.name.clone())
                .param("address", store.address.clone())
                .param("lat", store.latitude)
                .param("lon", store.longitude),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_query, RELEVANCE};

    #[test]
    fn relevance_query_uses_fulltext_and_score() {
        let spec = build_query("phone", None, RELEVANCE, 3, 6);
        let cypher = product_page_cypher(&spec);
        assert!(cypher.starts_with("CALL db.index.fulltext.queryNodes"));
        assert!(cypher.contains("ORDER BY score DESC"));
        assert!(cypher.contains("d.price * $expr_0 AS adjusted_price"));
        assert!(cypher.ends_with("SKIP $offset LIMIT $limit"));
    }

    #[test]
    fn field_sort_orders_by_both_levels() {
        let spec = build_query("phone", None, "price_desc", 3, 0);
        assert!(product_page_cypher(&spec).contains("ORDER BY d.price DESC, d.name ASC"));
    }

    #[test]
    fn empty_query_scans_all_documents() {
        let spec = build_query("", None, RELEVANCE, 3, 0);
        assert!(product_page_cypher(&spec).starts_with("MATCH (d:ProductDocument)"));
        assert!(product_count_cypher(&spec).ends_with("RETURN count(d) AS total"));
    }

    #[test]
    fn huge_offsets_saturate_as_bolt_ints() {
        assert_eq!(bolt_int(6), 6);
        assert_eq!(bolt_int(usize::MAX), i64::MAX);
    }

    #[test]
    fn terms_skip_field_predicates() {
        let terms = query_terms(r#"hp laptop category:"Laptops""#);
        assert_eq!(terms, vec!["hp".to_string(), "laptop".to_string()]);
    }

    #[test]
    fn short_text_snippet_is_unchanged() {
        assert_eq!(snippet("A small phone", &["phone".into()], 160), "A small phone");
    }

    #[test]
    fn snippet_centres_on_first_match() {
        let text = format!("{} battery {}", "x".repeat(100), "y".repeat(100));
        let s = snippet(&text, &["Battery".into()], 40);
        assert!(s.starts_with("..."));
        assert!(s.ends_with("..."));
        assert!(s.contains("battery"));
    }

    #[test]
    fn snippet_without_match_takes_prefix() {
        let text = "ñ".repeat(50);
        let s = snippet(&text, &["zzz".into()], 10);
        assert_eq!(s, format!("{}...", "ñ".repeat(10)));
    }

    #[test]
    fn hit_computes_requested_expressions() {
        let spec = build_query("", None, RELEVANCE, 3, 0);
        let doc = SearchDocument {
            doc_id: "d1".into(),
            pid: "p1".into(),
            name: "Phone".into(),
            description: "Nice phone".into(),
            category: "smartphones".into(),
            price: 100.0,
            brand: "Acme".into(),
            attributes: BTreeMap::new(),
        };
        let hit = ProductHit::from_document(doc, &spec, &[]);
        let adjusted = hit.number_expression("adjusted_price").unwrap();
        assert!((adjusted - 108.0).abs() < 1e-9);
        assert_eq!(hit.text_expression(DESCRIPTION), Some("Nice phone"));
    }
}
