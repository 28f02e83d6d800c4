//! Composición de consultas de producto para el buscador full-text.
//!
//! Aquí sólo se construye la consulta (`QuerySpec`); la ejecución vive en
//! `search_index`.

use serde::Serialize;

// Nombres de campo del documento de producto.
pub const PID: &str = "pid";
pub const PRODUCT_NAME: &str = "name";
pub const DESCRIPTION: &str = "description";
pub const CATEGORY: &str = "category";
pub const PRICE: &str = "price";
pub const BRAND: &str = "brand";

/// Clave de orden que selecciona el ranking por relevancia textual.
pub const RELEVANCE: &str = "relevance";

/// Campos resumen que siempre se piden al buscador.
pub const RETURNED_FIELDS: [&str; 5] = [PID, DESCRIPTION, CATEGORY, PRICE, PRODUCT_NAME];

/// Opciones de orden disponibles en la interfaz: (clave, etiqueta).
pub const SORT_MENU: [(&str, &str); 5] = [
    (RELEVANCE, "Relevancia"),
    ("price", "Precio: de menor a mayor"),
    ("price_desc", "Precio: de mayor a menor"),
    ("name", "Nombre"),
    ("brand", "Marca"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Name,
    Brand,
}

impl SortField {
    pub fn field_name(&self) -> &'static str {
        match self {
            SortField::Price => PRICE,
            SortField::Name => PRODUCT_NAME,
            SortField::Brand => BRAND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Una dimensión de orden sobre un campo del documento.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortExpression {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortExpression {
    /// Traduce una clave de orden de la interfaz a su expresión.
    pub fn from_key(key: &str) -> Option<Self> {
        let (field, direction) = match key {
            "price" => (SortField::Price, SortDirection::Ascending),
            "price_desc" => (SortField::Price, SortDirection::Descending),
            "name" => (SortField::Name, SortDirection::Ascending),
            "brand" => (SortField::Brand, SortDirection::Ascending),
            _ => return None,
        };
        Some(Self { field, direction })
    }
}

/// Segunda dimensión de orden por defecto.
const TIE_BREAK: SortExpression = SortExpression {
    field: SortField::Name,
    direction: SortDirection::Ascending,
};

/// Segunda dimensión cuando ya se ordena por el campo de desempate.
const ALT_TIE_BREAK: SortExpression = SortExpression {
    field: SortField::Price,
    direction: SortDirection::Ascending,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "expressions")]
pub enum SortSpec {
    /// Ranking por puntuación de coincidencia textual.
    MatchScore,
    /// Orden por campos, en prioridad decreciente.
    Fields(Vec<SortExpression>),
}

/// Expresión calculada por el buscador: `name = source * factor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExpression {
    pub name: &'static str,
    pub source_field: &'static str,
    pub factor: f64,
}

/// Precio ajustado con impuestos, devuelto como expresión calculada.
pub const ADJUSTED_PRICE: FieldExpression = FieldExpression {
    name: "adjusted_price",
    source_field: PRICE,
    factor: 1.08,
};

/// Consulta completa lista para enviar al buscador.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub query_string: String,
    pub sort: SortSpec,
    pub returned_fields: Vec<&'static str>,
    pub snippeted_fields: Vec<&'static str>,
    pub returned_expressions: Vec<FieldExpression>,
    pub limit: usize,
    pub offset: usize,
}

/// Construye la consulta de productos.
///
/// Si hay filtro de categoría se añade `category:"<valor>"` al texto libre;
/// las comillas hacen que el valor se trate como un único término atómico.
pub fn build_query(
    free_text: &str,
    category: Option<&str>,
    sort_key: &str,
    page_size: usize,
    offset: usize,
) -> QuerySpec {
    let mut query_string = free_text.to_string();
    if let Some(cat) = category.filter(|c| !c.trim().is_empty()) {
        query_string.push_str(&format!(" {}:{}", CATEGORY, quote_phrase(cat)));
    }

    QuerySpec {
        query_string: query_string.trim().to_string(),
        sort: sort_spec(sort_key),
        returned_fields: RETURNED_FIELDS.to_vec(),
        snippeted_fields: vec![DESCRIPTION],
        returned_expressions: vec![ADJUSTED_PRICE],
        limit: page_size,
        offset,
    }
}

/// Orden a dos niveles: campo pedido + desempate. Si el campo pedido es el de
/// desempate, el segundo nivel pasa a ser el precio.
pub fn sort_spec(sort_key: &str) -> SortSpec {
    if sort_key == RELEVANCE {
        return SortSpec::MatchScore;
    }
    match SortExpression::from_key(sort_key) {
        Some(primary) if primary.field == TIE_BREAK.field => {
            SortSpec::Fields(vec![primary, ALT_TIE_BREAK])
        }
        Some(primary) => SortSpec::Fields(vec![primary, TIE_BREAK]),
        None => SortSpec::MatchScore,
    }
}

/// Offset de paginación; cualquier valor que no sea un entero no negativo vale 0.
pub fn parse_offset(raw: &str) -> usize {
    raw.trim().parse::<usize>().unwrap_or(0)
}

/// Entrecomilla un valor para la sintaxis de consulta (Lucene).
pub fn quote_phrase(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_filter_is_quoted() {
        let spec = build_query("shoes", Some("Laptops"), RELEVANCE, 3, 0);
        assert_eq!(spec.query_string, r#"shoes category:"Laptops""#);
        assert!(!spec.query_string.contains("category:Laptops"));
    }

    #[test]
    fn empty_text_with_category_is_trimmed() {
        let spec = build_query("", Some("smartphones"), RELEVANCE, 3, 0);
        assert_eq!(spec.query_string, r#"category:"smartphones""#);

        let spec = build_query("  phone  ", Some(""), RELEVANCE, 3, 0);
        assert_eq!(spec.query_string, "phone");
    }

    #[test]
    fn quotes_inside_category_are_escaped() {
        assert_eq!(quote_phrase(r#"15" screens"#), r#""15\" screens""#);
    }

    #[test]
    fn relevance_uses_match_score() {
        assert_eq!(sort_spec("relevance"), SortSpec::MatchScore);
        assert_eq!(sort_spec("bogus"), SortSpec::MatchScore);
        assert_eq!(sort_spec(""), SortSpec::MatchScore);
    }

    #[test]
    fn field_sort_adds_tie_break() {
        let SortSpec::Fields(exprs) = sort_spec("price_desc") else {
            panic!("se esperaba orden por campos");
        };
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].field, SortField::Price);
        assert_eq!(exprs[0].direction, SortDirection::Descending);
        assert_eq!(exprs[1].field, SortField::Name);
    }

    #[test]
    fn sorting_on_tie_break_field_swaps_secondary() {
        let SortSpec::Fields(exprs) = sort_spec("name") else {
            panic!("se esperaba orden por campos");
        };
        assert_eq!(exprs[0].field, SortField::Name);
        assert_eq!(exprs[1].field, SortField::Price);
    }

    #[test]
    fn query_requests_summary_fields_and_snippet() {
        let spec = build_query("x", None, "brand", 5, 10);
        assert_eq!(spec.limit, 5);
        assert_eq!(spec.offset, 10);
        assert_eq!(spec.snippeted_fields, vec![DESCRIPTION]);
        assert!(spec.returned_fields.contains(&PRICE));
        assert_eq!(spec.returned_expressions[0].name, "adjusted_price");
    }

    #[test]
    fn malformed_offsets_default_to_zero() {
        assert_eq!(parse_offset("6"), 6);
        assert_eq!(parse_offset(" 9 "), 9);
        assert_eq!(parse_offset("-3"), 0);
        assert_eq!(parse_offset("abc"), 0);
        assert_eq!(parse_offset(""), 0);
        assert_eq!(parse_offset("2.5"), 0);
    }
}
