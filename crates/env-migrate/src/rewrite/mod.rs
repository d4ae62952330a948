//! Recursive traversal that finds and rewrites embedded asset URLs.
//!
//! The traversal is total over the cell variant: strings are scanned for
//! URL matches (rich text may hold several), JSON documents are walked
//! through arrays and object values, and every other primitive (numbers,
//! booleans, dates, timestamps, binary) passes through untouched.
//!
//! Collection and substitution are separate pure passes so every distinct
//! URL is resolved before any string is rewritten.

use crate::media::AssetUrlPattern;
use crate::value::CellValue;
use serde_json::Value;
use std::collections::HashMap;

/// Collect every distinct asset URL embedded in a cell, in order of first
/// appearance.
pub fn collect_urls(cell: &CellValue, pattern: &AssetUrlPattern) -> Vec<String> {
    let mut found = Vec::new();
    match cell {
        CellValue::Text(text) => scan_text(text, pattern, &mut found),
        CellValue::Json(value) => scan_json(value, pattern, &mut found),
        _ => {}
    }
    found
}

/// Substitute resolved URLs back into a cell, leaving structure intact.
pub fn apply(cell: &mut CellValue, pattern: &AssetUrlPattern, resolved: &HashMap<String, String>) {
    match cell {
        CellValue::Text(text) => {
            let rewritten = replace_text(text, pattern, resolved);
            *text = rewritten;
        }
        CellValue::Json(value) => replace_json(value, pattern, resolved),
        _ => {}
    }
}

fn scan_text(text: &str, pattern: &AssetUrlPattern, found: &mut Vec<String>) {
    for url in pattern.matches(text) {
        if !found.iter().any(|seen| seen == url) {
            found.push(url.to_string());
        }
    }
}

fn scan_json(value: &Value, pattern: &AssetUrlPattern, found: &mut Vec<String>) {
    match value {
        Value::String(text) => scan_text(text, pattern, found),
        Value::Array(items) => {
            for item in items {
                scan_json(item, pattern, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                scan_json(item, pattern, found);
            }
        }
        _ => {}
    }
}

fn replace_text(
    text: &str,
    pattern: &AssetUrlPattern,
    resolved: &HashMap<String, String>,
) -> String {
    pattern
        .regex()
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let url = &captures[0];
            resolved
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.to_string())
        })
        .into_owned()
}

fn replace_json(value: &mut Value, pattern: &AssetUrlPattern, resolved: &HashMap<String, String>) {
    match value {
        Value::String(text) => {
            let rewritten = replace_text(text, pattern, resolved);
            *text = rewritten;
        }
        Value::Array(items) => {
            for item in items {
                replace_json(item, pattern, resolved);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                replace_json(item, pattern, resolved);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SRC_URL: &str = "https://res.cloudinary.com/site-staging/image/upload/v1/hero.png";
    const DST_URL: &str = "https://res.cloudinary.com/site-prod/image/upload/v1/hero.png";

    fn pattern() -> AssetUrlPattern {
        AssetUrlPattern::for_account("site-staging")
    }

    fn mapping() -> HashMap<String, String> {
        HashMap::from([(SRC_URL.to_string(), DST_URL.to_string())])
    }

    #[test]
    fn test_collect_dedups_and_preserves_order() {
        let second = "https://res.cloudinary.com/site-staging/image/upload/v2/other.jpg";
        let cell = CellValue::Text(format!("{} {} {}", SRC_URL, second, SRC_URL));
        assert_eq!(collect_urls(&cell, &pattern()), vec![SRC_URL, second]);
    }

    #[test]
    fn test_nested_json_structure_is_preserved() {
        let document = serde_json::json!({
            "sections": [
                {
                    "title": "A",
                    "content": format!("<p><img src='{}'></p>", SRC_URL),
                }
            ]
        });
        let mut cell = CellValue::Json(document);

        let urls = collect_urls(&cell, &pattern());
        assert_eq!(urls, vec![SRC_URL]);

        apply(&mut cell, &pattern(), &mapping());
        let expected = serde_json::json!({
            "sections": [
                {
                    "title": "A",
                    "content": format!("<p><img src='{}'></p>", DST_URL),
                }
            ]
        });
        assert_eq!(cell, CellValue::Json(expected));
    }

    #[test]
    fn test_repeated_occurrences_get_the_same_replacement() {
        let mut cell = CellValue::Text(format!(
            "<img src='{u}'><img src=\"{u}\">",
            u = SRC_URL
        ));
        apply(&mut cell, &pattern(), &mapping());
        let CellValue::Text(html) = cell else {
            panic!("cell changed variant")
        };
        assert_eq!(html.matches(DST_URL).count(), 2);
        assert!(!html.contains("site-staging"));
    }

    #[test]
    fn test_unresolved_match_is_left_verbatim() {
        let mut cell = CellValue::Text(SRC_URL.to_string());
        apply(&mut cell, &pattern(), &HashMap::new());
        assert_eq!(cell, CellValue::Text(SRC_URL.to_string()));
    }

    #[test]
    fn test_primitives_pass_through_untouched() {
        let date = CellValue::Date(NaiveDate::from_ymd_opt(2020, 5, 4).unwrap());
        let bytes = CellValue::Bytes(vec![1, 2, 3]);
        let number = CellValue::I64(42);

        for cell in [&date, &bytes, &number] {
            assert!(collect_urls(cell, &pattern()).is_empty());
        }

        let mut mutated = date.clone();
        apply(&mut mutated, &pattern(), &mapping());
        assert_eq!(mutated, date);
    }

    #[test]
    fn test_json_array_elements_are_visited() {
        let mut cell = CellValue::Json(serde_json::json!([SRC_URL, 7, null, true]));
        apply(&mut cell, &pattern(), &mapping());
        assert_eq!(
            cell,
            CellValue::Json(serde_json::json!([DST_URL, 7, null, true]))
        );
    }
}
