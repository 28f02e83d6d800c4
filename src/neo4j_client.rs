use std::sync::Arc;

use crate::{
    config::{validate_index_name, AppConfig},
    models::{CategoryRecord, ProductRecord},
    store::{CategoryStore, ProductStore},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.neo4j_uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea constraints e índices para las etiquetas usadas en el grafo:
/// :Category, :Product, :ProductDocument y :Store, más el índice full-text de
/// productos y el índice de puntos de tiendas.
pub async fn ensure_schema(graph: &Graph, cfg: &AppConfig) -> Result<()> {
    validate_index_name(&cfg.product_index_name)?;
    validate_index_name(&cfg.store_index_name)?;

    let constraints = [
        // Category.name único: la siembra concurrente no puede duplicar nodos.
        "CREATE CONSTRAINT category_name IF NOT EXISTS
         FOR (c:Category)
         REQUIRE c.name IS UNIQUE",
        "CREATE CONSTRAINT product_pid IF NOT EXISTS
         FOR (p:Product)
         REQUIRE p.pid IS UNIQUE",
        "CREATE CONSTRAINT product_doc_id IF NOT EXISTS
         FOR (d:ProductDocument)
         REQUIRE d.doc_id IS UNIQUE",
        "CREATE CONSTRAINT store_id IF NOT EXISTS
         FOR (s:Store)
         REQUIRE s.store_id IS UNIQUE",
    ];
    for stmt in constraints {
        graph.run(query(stmt)).await?;
    }

    // Los nombres de índice no admiten parámetros; ya están validados arriba.
    let fulltext = format!(
        "CREATE FULLTEXT INDEX {name} IF NOT EXISTS
         FOR (d:ProductDocument)
         ON EACH [d.pid, d.name, d.description, d.category, d.brand]",
        name = cfg.product_index_name
    );
    graph.run(query(&fulltext)).await?;

    let points = format!(
        "CREATE POINT INDEX {name} IF NOT EXISTS
         FOR (s:Store)
         ON (s.location)",
        name = cfg.store_index_name
    );
    graph.run(query(&points)).await?;

    info!(
        "Esquema de Neo4j asegurado (constraints, índice full-text '{}' e índice de puntos '{}').",
        cfg.product_index_name, cfg.store_index_name
    );
    Ok(())
}

/// Almacén de registros y buscador sobre una misma conexión a Neo4j.
#[derive(Clone)]
pub struct Neo4jCatalog {
    pub graph: Arc<Graph>,
    pub product_index: String,
    pub store_index: String,
}

impl Neo4jCatalog {
    pub fn new(graph: Arc<Graph>, cfg: &AppConfig) -> Self {
        Self {
            graph,
            product_index: cfg.product_index_name.clone(),
            store_index: cfg.store_index_name.clone(),
        }
    }

    /// Health check mínimo.
    pub async fn ping(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for Neo4jCatalog {
    async fn has_categories(&self) -> Result<bool> {
        let mut cursor = self
            .graph
            .execute(query("MATCH (c:Category) RETURN c.name AS name LIMIT 1"))
            .await?;
        Ok(cursor.next().await?.is_some())
    }

    async fn create_category(&self, name: &str, parent: Option<&str>) -> Result<()> {
        // MERGE hace la creación idempotente.
        let q = match parent {
            None => query("MERGE (c:Category {name: $name})").param("name", name),
            Some(parent) => query(
                "MERGE (c:Category {name: $name})
                 WITH c MATCH (p:Category {name: $parent})
                 MERGE (c)-[:CHILD_OF]->(p)",
            )
            .param("name", name)
            .param("parent", parent),
        };
        self.graph.run(q).await?;
        Ok(())
    }

    async fn category_exists(&self, name: &str) -> Result<bool> {
        let mut cursor = self
            .graph
            .execute(
                query("MATCH (c:Category {name: $name}) RETURN c.name AS name LIMIT 1")
                    .param("name", name),
            )
            .await?;
        Ok(cursor.next().await?.is_some())
    }

    async fn list_categories(&self) -> Result<Vec<CategoryRecord>> {
        let mut cursor = self
            .graph
            .execute(query(
                "MATCH (c:Category)
                 OPTIONAL MATCH (c)-[:CHILD_OF]->(p:Category)
                 RETURN c.name AS name, p.name AS parent
                 ORDER BY name",
            ))
            .await?;

        let mut categories = Vec::new();
        while let Some(row) = cursor.next().await? {
            let name: String = row
                .get("name")
                .ok_or_else(|| anyhow!("Falta campo 'name' en resultado de Neo4j"))?;
            categories.push(CategoryRecord {
                name,
                parent: row.get("parent"),
            });
        }
        Ok(categories)
    }
}

#[async_trait]
impl ProductStore for Neo4jCatalog {
    async fn get_product(&self, pid: &str) -> Result<Option<ProductRecord>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (p:Product {pid: $pid})
                     RETURN p.price AS price, p.category AS category, p.active AS active,
                            p.doc_id AS doc_id, p.updated_at AS updated_at",
                )
                .param("pid", pid),
            )
            .await?;

        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };
        Ok(Some(ProductRecord {
            pid: pid.to_string(),
            price: row.get("price").unwrap_or_default(),
            category: row.get("category").unwrap_or_default(),
            active: row.get("active").unwrap_or(true),
            doc_id: row
                .get("doc_id")
                .ok_or_else(|| anyhow!("Producto {pid} sin doc_id en Neo4j"))?,
            updated_at: row.get("updated_at").unwrap_or_default(),
        }))
    }

    async fn put_product(&self, record: &ProductRecord) -> Result<()> {
        let txn = self.graph.start_txn().await?;
        txn.run(
            query(
                "MERGE (p:Product {pid: $pid})
                 SET p.price = $price, p.category = $category, p.active = $active,
                     p.doc_id = $doc_id, p.updated_at = $updated_at",
            )
            .param("pid", record.pid.clone())
            .param("price", record.price)
            .param("category", record.category.clone())
            .param("active", record.active)
            .param("doc_id", record.doc_id.clone())
            .param("updated_at", record.updated_at.clone()),
        )
        .await?;

        // Una re-ingesta puede cambiar la categoría: se rehace la relación.
        txn.run(
            query(
                "MATCH (p:Product {pid: $pid})-[old:IN_CATEGORY]->(:Category)
                 DELETE old",
            )
            .param("pid", record.pid.clone()),
        )
        .await?;
        txn.run(
            query(
                "MATCH (p:Product {pid: $pid}), (c:Category {name: $category})
                 MERGE (p)-[:IN_CATEGORY]->(c)",
            )
            .param("pid", record.pid.clone())
            .param("category", record.category.clone()),
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }
}
