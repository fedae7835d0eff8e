// ✂️ Splitter - one single-page document per matched boleto
//
// Precondition on the input: `ordered_names[i]` is the subject printed on
// page i of the source document. Nothing in the document is inspected to
// confirm this; the caller owns the ordering.
//
// Matching policy:
// - one bulk lookup for every distinct name
// - a name with several stored boletos uses the lowest id (first stored)
// - a repeated name in the list maps every occurrence to that same boleto
// - a name with no stored boleto skips its page: no output, no error
// - a blank name holds its position and skips its page

use crate::db::{self, BoletoRef};
use crate::error::{ServiceError, ServiceResult};
use crate::pdf::SourceDocument;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// A list position matched to a stored boleto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMatch {
    pub page_index: usize,
    pub record_id: i64,
}

/// Output of a split: the boleto id and its standalone page
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPage {
    pub record_id: i64,
    pub page_index: usize,
    pub bytes: Vec<u8>,
}

/// Parse a caller-supplied ordering: a JSON array of strings, or one name
/// per line. Names are trimmed; a blank entry keeps its position and matches
/// nothing. Trailing blank lines are dropped in the line format only.
pub fn parse_name_list(raw: &str) -> ServiceResult<Vec<String>> {
    let names: Vec<String> = if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw.trim())
            .map_err(|e| ServiceError::validation(format!("invalid name list: {}", e)))?
            .into_iter()
            .map(|n| n.trim().to_string())
            .collect()
    } else {
        let mut lines: Vec<String> = raw.lines().map(|n| n.trim().to_string()).collect();
        while lines.last().is_some_and(|n| n.is_empty()) {
            lines.pop();
        }
        lines
    };

    if names.iter().all(|n| n.is_empty()) {
        return Err(ServiceError::validation("name list is empty"));
    }
    Ok(names)
}

/// Align list positions to fetched boletos. Pure; order follows the list.
pub fn align_pages(ordered_names: &[String], fetched: &[BoletoRef]) -> Vec<PageMatch> {
    // `fetched` is ordered by id, so the first insert per name wins
    let mut first_by_name: HashMap<&str, i64> = HashMap::new();
    for boleto in fetched {
        first_by_name
            .entry(boleto.subject_name.as_str())
            .or_insert(boleto.id);
    }

    ordered_names
        .iter()
        .enumerate()
        .filter_map(|(page_index, name)| match first_by_name.get(name.as_str()) {
            _ if name.is_empty() => {
                debug!(page = page_index, "blank name; page skipped");
                None
            }
            Some(&record_id) => Some(PageMatch {
                page_index,
                record_id,
            }),
            None => {
                warn!(page = page_index, name = %name, "no stored boleto for name; page skipped");
                None
            }
        })
        .collect()
}

/// Fetch the boletos named in `ordered_names` and match them to positions
pub fn match_pages(conn: &Connection, ordered_names: &[String]) -> ServiceResult<Vec<PageMatch>> {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = ordered_names
        .iter()
        .filter(|name| !name.is_empty() && seen.insert(name.as_str()))
        .cloned()
        .collect();

    let fetched = db::find_boletos_by_subject_names(conn, &distinct)?;
    Ok(align_pages(ordered_names, &fetched))
}

/// Check the page-count guard and match positions to boletos. Only this
/// step needs the store; extraction runs without it.
pub fn plan_split(
    conn: &Connection,
    page_count: usize,
    ordered_names: &[String],
) -> ServiceResult<Vec<PageMatch>> {
    if ordered_names.len() > page_count {
        return Err(ServiceError::validation(format!(
            "{} names supplied but the document has only {} pages",
            ordered_names.len(),
            page_count
        )));
    }

    match_pages(conn, ordered_names)
}

/// Extract one standalone page per match, in match order
pub fn split_document(source: &SourceDocument, matches: &[PageMatch]) -> ServiceResult<Vec<SplitPage>> {
    let mut pages = Vec::with_capacity(matches.len());
    for m in matches {
        let bytes = source.extract_page(m.page_index)?;
        debug!(page = m.page_index, record_id = m.record_id, "page extracted");
        pages.push(SplitPage {
            record_id: m.record_id,
            page_index: m.page_index,
            bytes,
        });
    }

    info!(
        pages = source.page_count(),
        emitted = pages.len(),
        "document split"
    );

    Ok(pages)
}
