// Pagination detection and result normalization

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CURSOR_MARKERS: &[&str] = &[
    "page",
    "offset",
    "cursor",
    "next_token",
    "starting_after",
    "marker",
];

pub const LIMIT_MARKERS: &[&str] = &["limit", "per_page", "page_size", "max_results", "count", "top"];

/// Upper bound on pages fetched by a single collect-all call
pub const MAX_PAGES: usize = 10;

/// Page size used when the caller did not choose one
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Keys carrying the next-page cursor in a page result, in lookup order
const NEXT_CURSOR_KEYS: &[&str] = &["next_page_token", "next_cursor", "next"];

/// Keys carrying the item list in a page result, in lookup order
const ITEM_KEYS: &[&str] = &["items", "data"];

/// Pagination parameters detected on a tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_param: Option<String>,
}

impl PaginationInfo {
    pub fn is_paginated(&self) -> bool {
        self.cursor_param.is_some() || self.limit_param.is_some()
    }
}

/// Find the cursor and limit parameters; first match in declared order wins
pub fn detect_pagination<'a, I>(parameter_names: I) -> PaginationInfo
where
    I: IntoIterator<Item = &'a str>,
{
    let mut info = PaginationInfo::default();

    for name in parameter_names {
        let lower = name.to_lowercase();
        if info.cursor_param.is_none() && CURSOR_MARKERS.iter().any(|m| lower.contains(m)) {
            info.cursor_param = Some(name.to_string());
        }
        if info.limit_param.is_none() && LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
            info.limit_param = Some(name.to_string());
        }
    }

    info
}

/// Set the page size when the caller left it unset
pub fn apply_default_limit(
    arguments: &mut serde_json::Map<String, Value>,
    info: &PaginationInfo,
    max_items: usize,
) {
    if let Some(limit_param) = &info.limit_param {
        if !arguments.contains_key(limit_param) {
            arguments.insert(
                limit_param.clone(),
                Value::from(max_items.min(DEFAULT_PAGE_SIZE)),
            );
        }
    }
}

/// Items of a list-like result, if it has that shape
pub fn extract_items(result: &Value) -> Option<&Vec<Value>> {
    match result {
        Value::Array(items) => Some(items),
        Value::Object(map) => ITEM_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

/// Cursor for the next page, if the result exposes one
pub fn extract_next_cursor(result: &Value) -> Option<Value> {
    let map = result.as_object()?;
    NEXT_CURSOR_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            _ => true,
        })
        .cloned()
}

/// Truncate a single page to `max_items`.
/// Results without a list shape are returned unchanged with `truncated = false`.
pub fn truncate_page(result: Value, max_items: usize) -> (Value, bool) {
    let Some(items) = extract_items(&result) else {
        return (result, false);
    };

    let truncated = items.len() > max_items;
    let kept: Vec<Value> = items.iter().take(max_items).cloned().collect();
    let count = kept.len();
    (
        json!({
            "items": kept,
            "count": count,
            "truncated": truncated,
        }),
        truncated,
    )
}

/// Accumulates items across pages
#[derive(Debug, Default)]
pub struct PageCollector {
    items: Vec<Value>,
    pages: usize,
    max_items: usize,
}

impl PageCollector {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            pages: 0,
            max_items,
        }
    }

    /// Whether another page may be fetched
    pub fn wants_more(&self) -> bool {
        self.items.len() < self.max_items && self.pages < MAX_PAGES
    }

    /// Record a page; returns the number of items it contributed
    pub fn push_page(&mut self, page: &Value) -> usize {
        self.pages += 1;
        match extract_items(page) {
            Some(items) => {
                self.items.extend(items.iter().cloned());
                items.len()
            }
            None => 0,
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn finish(mut self) -> (Value, bool) {
        let truncated = self.items.len() > self.max_items;
        self.items.truncate(self.max_items);
        let count = self.items.len();
        (
            json!({
                "items": self.items,
                "count": count,
                "pages_collected": self.pages,
                "truncated": truncated,
            }),
            truncated,
        )
    }
}
