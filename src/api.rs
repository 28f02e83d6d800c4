use axum::{
    extract::{Form, Json, Query, State},
    http::{header::HOST, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::spawn;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use crate::{
    app_state::{AppState, Status},
    categories::CategoryCache,
    config::AppConfig,
    ingest,
    models::CategoryInfo,
    pagination::{compute_links, pagination_links},
    query::{build_query, parse_offset},
    search_index::{GeoQuery, SearchBackend, SearchPage},
    store::Catalog,
    views::{IndexView, NotificationView, ProductView, SearchResultItem, SearchResultsView, StoreView},
};

/// Ruta de la búsqueda de productos (también usada en los enlaces de paginación).
pub const SEARCH_PATH: &str = "/api/psearch";
/// Radio por defecto de la búsqueda de tiendas, en metros.
pub const DEFAULT_STORE_RADIUS_M: f64 = 40_000.0;

// --- Parámetros admitidos por cada endpoint ---
// Cualquier otro parámetro de la petición se ignora.

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchParams {
    pub qtype: String,
    pub query: String,
    pub category: String,
    pub sort: String,
    pub offset: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            qtype: String::new(),
            query: String::new(),
            category: String::new(),
            sort: String::new(),
            offset: "0".to_string(),
        }
    }
}

impl SearchParams {
    fn pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("qtype", self.qtype.as_str()),
            ("query", self.query.as_str()),
            ("category", self.category.as_str()),
            ("sort", self.sort.as_str()),
            ("offset", self.offset.as_str()),
        ]
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductParams {
    pub pid: String,
    pub pname: String,
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreParams {
    pub location_query: String,
    pub latitude: String,
    pub longitude: String,
    pub radius: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/index", get(index_handler))
        .route(SEARCH_PATH, get(product_search_handler).post(product_search_post_handler))
        .route("/api/product", get(show_product_handler))
        .route("/api/stores", get(store_location_handler))
        .route("/api/admin/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/neo4j-info", get(neo4j_info_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Lógica de los handlers (independiente de axum) ---

/// Categorías para los menús. Si el almacén falla se muestra el menú vacío.
async fn load_category_info<C>(catalog: &C, cache: &CategoryCache) -> Vec<CategoryInfo>
where
    C: Catalog + ?Sized,
{
    cache.get_or_load(catalog).await.unwrap_or_else(|e| {
        error!("Error cargando categorías: {e}");
        Vec::new()
    })
}

/// Ejecuta una búsqueda de productos y prepara la vista de resultados.
/// Un error del buscador se registra y se muestra como búsqueda sin resultados.
pub async fn do_product_search<C>(
    catalog: &C,
    cache: &CategoryCache,
    cfg: &AppConfig,
    params: &SearchParams,
) -> SearchResultsView
where
    C: Catalog + ?Sized,
{
    let cat_info = load_category_info(catalog, cache).await;
    let doc_limit = cfg.doc_limit;
    let offset = parse_offset(&params.offset);
    let category = Some(params.category.as_str()).filter(|c| !c.is_empty());

    let spec = build_query(&params.query, category, &params.sort, doc_limit, offset);
    let page = match catalog.search_products(&spec).await {
        Ok(page) => page,
        Err(e) => {
            error!("Error en la búsqueda de productos '{}': {e}", spec.query_string);
            SearchPage::default()
        }
    };
    debug!("returned_count: {}", page.returned_count);

    let state = compute_links(
        offset,
        doc_limit,
        page.returned_count,
        page.number_found,
        cfg.offset_limit,
    );
    let (prev_link, next_link) = pagination_links(SEARCH_PATH, &params.pairs(), state);

    let print_query = if spec.query_string.is_empty() {
        "Todos".to_string()
    } else {
        spec.query_string.clone()
    };

    SearchResultsView {
        template: "index",
        base_pquery: params.query.clone(),
        next_link,
        prev_link,
        qtype: "product",
        query: spec.query_string,
        print_query,
        pcategory: params.category.clone(),
        sort_order: params.sort.clone(),
        category_name: params.category.clone(),
        first_res: offset.saturating_add(1),
        last_res: offset.saturating_add(page.returned_count),
        returned_count: page.returned_count,
        number_found: page.number_found,
        search_response: page.documents.iter().map(SearchResultItem::from).collect(),
        cat_info,
        sort_info: crate::views::sort_menu(),
    }
}

#[derive(Debug)]
pub enum ProductLookup {
    MissingPid,
    NotFound(String),
    Found(Box<ProductView>),
}

/// Busca el documento de un producto por pid, junto con su registro "core".
pub async fn lookup_product<C>(
    catalog: &C,
    params: &ProductParams,
    app_url: &str,
) -> anyhow::Result<ProductLookup>
where
    C: Catalog + ?Sized,
{
    let pid = params.pid.trim();
    if pid.is_empty() {
        return Ok(ProductLookup::MissingPid);
    }
    let Some(doc) = catalog.product_document(pid).await? else {
        return Ok(ProductLookup::NotFound(pid.to_string()));
    };
    let record = catalog.get_product(pid).await?;

    Ok(ProductLookup::Found(Box::new(ProductView {
        template: "product",
        app_url: app_url.to_string(),
        pid: pid.to_string(),
        pname: doc.name.clone(),
        category: doc.category.clone(),
        prod_doc: doc,
        record,
    })))
}

fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

/// Separa `location_query` en texto libre y radio. El cliente puede mandar un
/// predicado de distancia (`distance(store_location, geopoint(lat, lon)) < 40000`);
/// de él sólo se usa el radio, porque el centro ya llega en `latitude`/`longitude`.
pub fn parse_location_query(raw: &str) -> (String, Option<f64>) {
    let trimmed = raw.trim();
    if !trimmed.to_ascii_lowercase().starts_with("distance(") {
        return (trimmed.to_string(), None);
    }
    let radius = trimmed
        .rfind(')')
        .map(|end| trimmed[end + 1..].trim())
        .and_then(|tail| tail.strip_prefix('<'))
        .map(|tail| tail.trim_start_matches('=').trim())
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r > 0.0);
    if radius.is_none() {
        warn!("Predicado de distancia no reconocido: '{trimmed}'");
    }
    (String::new(), radius)
}

/// Tiendas cercanas ordenadas por distancia. Cualquier error devuelve `[]`.
pub async fn do_store_search<C>(catalog: &C, params: &StoreParams) -> Vec<StoreView>
where
    C: SearchBackend + ?Sized,
{
    let (Some(latitude), Some(longitude)) = (
        parse_coordinate(&params.latitude, 90.0),
        parse_coordinate(&params.longitude, 180.0),
    ) else {
        warn!(
            "Coordenadas no válidas: lat '{}', lon '{}'",
            params.latitude, params.longitude
        );
        return Vec::new();
    };
    let (text, query_radius) = parse_location_query(&params.location_query);
    // Un `radius` explícito manda sobre el del predicado.
    let radius_m = params
        .radius
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && *r > 0.0)
        .or(query_radius)
        .unwrap_or(DEFAULT_STORE_RADIUS_M);

    let geo = GeoQuery {
        text,
        latitude,
        longitude,
        radius_m,
    };
    match catalog.search_stores(&geo).await {
        Ok(hits) => {
            let stores: Vec<StoreView> = hits.into_iter().map(StoreView::from).collect();
            info!("Tiendas encontradas: {}", stores.len());
            stores
        }
        Err(e) => {
            error!("Error en la búsqueda de tiendas: {e}");
            Vec::new()
        }
    }
}

// --- Handlers ---

#[axum::debug_handler]
async fn index_handler(State(state): State<AppState>) -> Json<IndexView> {
    let cat_info = load_category_info(state.catalog.as_ref(), &state.category_cache).await;
    Json(IndexView::new(cat_info))
}

#[axum::debug_handler]
async fn product_search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResultsView> {
    let view = do_product_search(
        state.catalog.as_ref(),
        &state.category_cache,
        &state.config,
        &params,
    )
    .await;
    Json(view)
}

/// El formulario se reenvía como GET para que los resultados tengan URL propia.
#[axum::debug_handler]
async fn product_search_post_handler(Form(params): Form<SearchParams>) -> Redirect {
    Redirect::to(&format!("{SEARCH_PATH}?{}", params.to_query_string()))
}

#[axum::debug_handler]
async fn show_product_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ProductParams>,
) -> Response {
    let app_url = match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}/"),
        None => format!("http://{}/", state.config.server_addr),
    };

    match lookup_product(state.catalog.as_ref(), &params, &app_url).await {
        Ok(ProductLookup::Found(view)) => Json(*view).into_response(),
        Ok(ProductLookup::MissingPid) => (
            StatusCode::BAD_REQUEST,
            Json(NotificationView::error(
                "Error: no se ha indicado el id de producto.",
                "/",
                "Ir a la búsqueda de productos.",
            )),
        )
            .into_response(),
        Ok(ProductLookup::NotFound(pid)) => {
            let msg = format!("Documento no encontrado para el pid {pid}.");
            error!("{msg}");
            (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
        }
        Err(e) => {
            error!("Error consultando el producto {}: {e}", params.pid);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Error al consultar el producto: {}", e)})),
            )
                .into_response()
        }
    }
}

#[axum::debug_handler]
async fn store_location_handler(
    State(state): State<AppState>,
    Query(params): Query<StoreParams>,
) -> Json<Vec<StoreView>> {
    Json(do_store_search(state.catalog.as_ref(), &params).await)
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    {
        let mut status = state.status.lock().unwrap();
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una ingesta en curso."})),
            ));
        }
        status.is_busy = true;
        status.message = "Iniciando ingesta de datos de ejemplo...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let result = ingest::ingest_directory(
            state.catalog.as_ref(),
            &state.config.sample_data_dir,
            state.status.clone(),
        )
        .await;
        state.category_cache.invalidate().await;

        let mut status = state.status.lock().unwrap();
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Ingesta completada! {}", summary);
                info!("Ingesta completada. {}", summary);
            }
            Err(err) => {
                status.message = format!("Error en la ingesta: {}", err);
                error!("Error de ingesta: {}", err);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn neo4j_info_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let browser_url = match url::Url::parse(&state.config.neo4j_uri) {
        Ok(mut url) => {
            let _ = url.set_scheme("http");
            let _ = url.set_port(Some(7474));
            url.to_string()
        }
        Err(_) => "http://localhost:7474".to_string(),
    };

    match state.catalog.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ok",
            "browser_url": browser_url,
            "product_index": state.config.product_index_name,
            "store_index": state.config.store_index_name,
        }))),
        Err(e) => {
            error!("Error en el health check de Neo4j: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
