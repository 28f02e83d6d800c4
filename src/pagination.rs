//! Cálculo de los enlaces anterior/siguiente de la paginación de resultados.

use serde::Serialize;
use url::form_urlencoded;

/// Offsets de navegación de una página de resultados.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub prev_offset: Option<usize>,
    pub next_offset: Option<usize>,
}

/// Calcula los offsets de la página anterior y siguiente.
///
/// - Hay página anterior si `offset - page_size >= 0`.
/// - Hay página siguiente si no se supera `max_offset`, la página actual vino
///   completa (una página corta indica fin de resultados) y quedan resultados
///   por mostrar.
pub fn compute_links(
    offset: usize,
    page_size: usize,
    returned_count: usize,
    total_found: usize,
    max_offset: usize,
) -> PaginationState {
    let prev_offset = offset.checked_sub(page_size);

    let next_candidate = offset.saturating_add(page_size);
    let next_offset = (next_candidate <= max_offset
        && returned_count == page_size
        && offset.saturating_add(returned_count) < total_found)
        .then_some(next_candidate);

    PaginationState {
        prev_offset,
        next_offset,
    }
}

/// Construye un enlace de paginación copiando los parámetros de la petición y
/// sustituyendo el offset.
pub fn pagination_link(path: &str, params: &[(&str, &str)], offset: usize) -> String {
    let offset = offset.to_string();
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        if *key == "offset" {
            serializer.append_pair(key, &offset);
        } else {
            serializer.append_pair(key, value);
        }
    }
    if !params.iter().any(|(k, _)| *k == "offset") {
        serializer.append_pair("offset", &offset);
    }
    format!("{path}?{}", serializer.finish())
}

/// Enlaces (anterior, siguiente) para un estado de paginación.
pub fn pagination_links(
    path: &str,
    params: &[(&str, &str)],
    state: PaginationState,
) -> (Option<String>, Option<String>) {
    (
        state.prev_offset.map(|o| pagination_link(path, params, o)),
        state.next_offset.map(|o| pagination_link(path, params, o)),
    )
}
