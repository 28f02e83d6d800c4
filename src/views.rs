//! Valores que se entregan a la capa de presentación (JSON para el frontend).
//! Cada vista lleva el nombre de la plantilla que la pinta.

use serde::Serialize;
use url::form_urlencoded;

use crate::{
    models::{CategoryInfo, ProductRecord, SearchDocument},
    query::{ADJUSTED_PRICE, DESCRIPTION, SORT_MENU},
    search_index::{ProductHit, StoreHit},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortOption {
    pub key: &'static str,
    pub label: &'static str,
}

pub fn sort_menu() -> Vec<SortOption> {
    SORT_MENU
        .iter()
        .map(|&(key, label)| SortOption { key, label })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct IndexView {
    pub template: &'static str,
    pub cat_info: Vec<CategoryInfo>,
    pub sort_info: Vec<SortOption>,
}

impl IndexView {
    pub fn new(cat_info: Vec<CategoryInfo>) -> Self {
        Self {
            template: "index",
            cat_info,
            sort_info: sort_menu(),
        }
    }
}

/// Un resultado de búsqueda tal y como lo muestra la plantilla.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    /// pid codificado para usarlo en URLs.
    pub pid: String,
    pub category: String,
    pub description_snippet: String,
    pub price: f64,
    pub adjusted_price: Option<f64>,
    pub name: String,
}

impl From<&ProductHit> for SearchResultItem {
    fn from(hit: &ProductHit) -> Self {
        // Si el buscador no devuelve snippet se usa la descripción completa.
        let description_snippet = hit
            .text_expression(DESCRIPTION)
            .unwrap_or(&hit.description)
            .to_string();
        Self {
            pid: form_urlencoded::byte_serialize(hit.pid.as_bytes()).collect(),
            category: hit.category.clone(),
            description_snippet,
            price: hit.price,
            adjusted_price: hit.number_expression(ADJUSTED_PRICE.name),
            name: hit.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResultsView {
    pub template: &'static str,
    pub base_pquery: String,
    pub next_link: Option<String>,
    pub prev_link: Option<String>,
    pub qtype: &'static str,
    pub query: String,
    pub print_query: String,
    pub pcategory: String,
    pub sort_order: String,
    pub category_name: String,
    pub first_res: usize,
    pub last_res: usize,
    pub returned_count: usize,
    pub number_found: usize,
    pub search_response: Vec<SearchResultItem>,
    pub cat_info: Vec<CategoryInfo>,
    pub sort_info: Vec<SortOption>,
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub template: &'static str,
    pub app_url: String,
    pub pid: String,
    pub pname: String,
    pub category: String,
    pub prod_doc: SearchDocument,
    pub record: Option<ProductRecord>,
}

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub template: &'static str,
    pub title: String,
    pub msg: String,
    pub goto_url: String,
    pub linktext: String,
}

impl NotificationView {
    pub fn error(msg: &str, goto_url: &str, linktext: &str) -> Self {
        Self {
            template: "notification",
            title: "Error".to_string(),
            msg: msg.to_string(),
            goto_url: goto_url.to_string(),
            linktext: linktext.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreView {
    pub addr: String,
    pub storename: String,
    pub lat: f64,
    pub lon: f64,
}

impl From<StoreHit> for StoreView {
    fn from(hit: StoreHit) -> Self {
        Self {
            addr: hit.store.address,
            storename: hit.store.name,
            lat: hit.store.latitude,
            lon: hit.store.longitude,
        }
    }
}
