// 🔎 Query Filter Builder - optional filters → parameterized predicate
//
// Fragments reference their value by position (?1, ?2, ...) in the order
// they were added; caller text only ever travels as a bound value.

use rusqlite::types::Value;
use serde::Deserialize;

/// Optional filters for the boleto listing.
///
/// Field names accept both the API's Portuguese query keys and English ones.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterParams {
    /// Case-insensitive substring of the subject name
    #[serde(default, alias = "nome")]
    pub name: Option<String>,

    #[serde(default, alias = "valor_inicial", alias = "valueMin")]
    pub value_min: Option<f64>,

    #[serde(default, alias = "valor_final", alias = "valueMax")]
    pub value_max: Option<f64>,

    #[serde(default, alias = "id_lote", alias = "batchId")]
    pub batch_id: Option<i64>,
}

/// Predicate fragments (ANDed together) plus their positional values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub fragments: Vec<String>,
    pub values: Vec<Value>,
}

impl Filter {
    fn push(&mut self, fragment: impl FnOnce(usize) -> String, value: Value) {
        self.values.push(value);
        let position = self.values.len();
        self.fragments.push(fragment(position));
    }

    /// `WHERE a AND b ...`, or empty when nothing was requested
    pub fn where_clause(&self) -> String {
        if self.fragments.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.fragments.join(" AND "))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

pub fn build_filter(params: &FilterParams) -> Filter {
    let mut filter = Filter::default();

    // A blank name is treated as absent, not as "match everything twice"
    if let Some(name) = params.name.as_deref().filter(|n| !n.is_empty()) {
        filter.push(
            |p| format!("lower_unicode(subject_name) LIKE ?{} ESCAPE '\\'", p),
            Value::Text(format!("%{}%", escape_like(&name.to_lowercase()))),
        );
    }

    if let Some(min) = params.value_min {
        filter.push(|p| format!("value >= ?{}", p), Value::Real(min));
    }

    if let Some(max) = params.value_max {
        filter.push(|p| format!("value <= ?{}", p), Value::Real(max));
    }

    if let Some(batch_id) = params.batch_id {
        filter.push(|p| format!("batch_id = ?{}", p), Value::Integer(batch_id));
    }

    filter
}

/// Both sides are lowercased before LIKE; only the wildcards themselves
/// need escaping so "50%" matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
