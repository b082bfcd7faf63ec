//! In-memory paging over a fully fetched record set.
//!
//! Filters go through the same clause routing as the query translator, so a
//! column filter selects the same records whether it runs here or on the
//! server. Static filters and status are not re-applied; the record set was
//! fetched with them.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::{FilterClause, FilterOperator, Operand, RequestSpec, Scalar};

/// One page of a locally filtered and sorted record set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPage {
    pub rows: Vec<Value>,
    /// Records left after filtering
    pub total_items: u64,
    pub total_pages: u64,
    pub page_index: usize,
    pub page_size: usize,
}

impl LocalPage {
    /// Filter, search, sort and slice `records` for `spec`.
    ///
    /// `search_fields` are the fields the global search text is matched
    /// against (case-insensitive contains, any field).
    pub fn from_records(records: &[Value], spec: &RequestSpec, search_fields: &[String]) -> Self {
        let clauses: Vec<(&str, FilterClause)> = spec
            .column_filters
            .iter()
            .filter_map(|f| f.value.to_clause().map(|c| (f.field_id.as_str(), c)))
            .collect();
        let search = spec
            .global_filter
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !search_fields.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<&Value> = records
            .iter()
            .filter(|record| {
                clauses
                    .iter()
                    .all(|(field, clause)| matches_clause(lookup(record, field), clause))
            })
            .filter(|record| match &search {
                Some(needle) => search_fields.iter().any(|field| {
                    lookup(record, field).is_some_and(|v| text_of(v).to_lowercase().contains(needle))
                }),
                None => true,
            })
            .collect();

        if let Some(entry) = spec.primary_sort() {
            rows.sort_by(|a, b| {
                let ordering = compare_values(lookup(a, &entry.field_id), lookup(b, &entry.field_id));
                match (lookup(a, &entry.field_id), lookup(b, &entry.field_id)) {
                    // nulls last in both directions
                    (None, _) | (_, None) => ordering,
                    _ if entry.descending => ordering.reverse(),
                    _ => ordering,
                }
            });
        }

        let page_size = spec.effective_page_size();
        let total_items = rows.len() as u64;
        let total_pages = total_items.div_ceil(page_size as u64);
        let rows = rows
            .into_iter()
            .skip(spec.page_index.saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        Self {
            rows,
            total_items,
            total_pages,
            page_index: spec.page_index,
            page_size,
        }
    }
}

/// Resolve a dotted path; JSON null counts as absent.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |value, segment| value.get(segment))
        .filter(|v| !v.is_null())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_text(scalar: &Scalar) -> String {
    scalar.to_string()
}

/// Order a record value against an operand.
///
/// Numbers compare numerically when both sides parse as numbers, booleans
/// by value, everything else as text.
fn compare_scalar(value: &Value, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        _ => {
            let left = as_number(value);
            let right = scalar_text(scalar).parse::<f64>().ok();
            match (left, right) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(text_of(value).cmp(&scalar_text(scalar))),
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn equals(value: &Value, scalar: &Scalar) -> bool {
    compare_scalar(value, scalar) == Some(Ordering::Equal)
}

fn matches_clause(value: Option<&Value>, clause: &FilterClause) -> bool {
    use FilterOperator as Op;

    let Some(value) = value else {
        return clause.operator == Op::IsNull;
    };
    let one = match &clause.operand {
        Some(Operand::One(scalar)) => Some(scalar),
        _ => None,
    };
    let many: &[Scalar] = match &clause.operand {
        Some(Operand::Many(items)) => items,
        _ => &[],
    };
    let text = text_of(value);
    let lower = text.to_lowercase();
    let needle = one.map(scalar_text).unwrap_or_default();
    let needle_lower = needle.to_lowercase();

    match clause.operator {
        Op::IsNull => false,
        Op::IsNotNull => true,
        Op::Equals => one.is_some_and(|s| equals(value, s)),
        Op::EqualsInsensitive => lower == needle_lower,
        Op::NotEquals => one.is_some_and(|s| !equals(value, s)),
        Op::LessThan => one.and_then(|s| compare_scalar(value, s)) == Some(Ordering::Less),
        Op::LessOrEqual => one
            .and_then(|s| compare_scalar(value, s))
            .is_some_and(|o| o != Ordering::Greater),
        Op::GreaterThan => one.and_then(|s| compare_scalar(value, s)) == Some(Ordering::Greater),
        Op::GreaterOrEqual => one
            .and_then(|s| compare_scalar(value, s))
            .is_some_and(|o| o != Ordering::Less),
        Op::In => many.iter().any(|s| equals(value, s)),
        Op::NotIn => !many.iter().any(|s| equals(value, s)),
        Op::Contains => text.contains(&needle),
        Op::NotContains => !text.contains(&needle),
        Op::ContainsInsensitive => lower.contains(&needle_lower),
        Op::NotContainsInsensitive => !lower.contains(&needle_lower),
        Op::Between => match many {
            [low, high] => {
                compare_scalar(value, low).is_some_and(|o| o != Ordering::Less)
                    && compare_scalar(value, high).is_some_and(|o| o != Ordering::Greater)
            }
            _ => false,
        },
        Op::StartsWith => text.starts_with(&needle),
        Op::StartsWithInsensitive => lower.starts_with(&needle_lower),
        Op::EndsWith => text.ends_with(&needle),
        Op::EndsWithInsensitive => lower.ends_with(&needle_lower),
    }
}

/// Sort order for two record values; absent values go last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => text_of(a).to_lowercase().cmp(&text_of(b).to_lowercase()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterValue, SortEntry};
    use serde_json::json;

    fn records() -> Vec<Value> {
        vec![
            json!({ "id": 1, "title": "Intro to Rust", "price": 30, "category": { "name": "Systems" } }),
            json!({ "id": 2, "title": "advanced rust", "price": 80, "category": { "name": "Systems" } }),
            json!({ "id": 3, "title": "Cooking", "price": null, "category": { "name": "Lifestyle" } }),
            json!({ "id": 4, "title": "Baking", "price": 10, "category": null }),
            json!({ "id": 5, "title": "Rust async", "price": 55, "category": { "name": "Systems" } }),
        ]
    }

    fn ids(page: &LocalPage) -> Vec<i64> {
        page.rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_pages_are_sliced() {
        let page = LocalPage::from_records(&records(), &RequestSpec::page(1, 2), &[]);
        assert_eq!(ids(&page), vec![3, 4]);
        assert_eq!(page.total_items, 5);
        assert_eq!(page.total_pages, 3);

        let past_end = LocalPage::from_records(&records(), &RequestSpec::page(9, 2), &[]);
        assert!(past_end.rows.is_empty());
    }

    #[test]
    fn test_sort_text_case_insensitive() {
        let spec = RequestSpec::page(0, 10).with_sort(SortEntry::asc("title"));
        let page = LocalPage::from_records(&records(), &spec, &[]);
        assert_eq!(ids(&page), vec![2, 4, 3, 1, 5]);
    }

    #[test]
    fn test_sort_numbers_with_nulls_last() {
        let spec = RequestSpec::page(0, 10).with_sort(SortEntry::desc("price"));
        let page = LocalPage::from_records(&records(), &spec, &[]);
        assert_eq!(ids(&page), vec![2, 5, 1, 4, 3]);

        let spec = RequestSpec::page(0, 10).with_sort(SortEntry::asc("price"));
        let page = LocalPage::from_records(&records(), &spec, &[]);
        assert_eq!(ids(&page), vec![4, 1, 5, 2, 3]);
    }

    #[test]
    fn test_global_search_across_fields() {
        let fields = vec!["title".to_string(), "category.name".to_string()];
        let spec = RequestSpec::page(0, 10).with_global_filter(" RUST ");
        let page = LocalPage::from_records(&records(), &spec, &fields);
        assert_eq!(ids(&page), vec![1, 2, 5]);

        let spec = RequestSpec::page(0, 10).with_global_filter("lifestyle");
        let page = LocalPage::from_records(&records(), &spec, &fields);
        assert_eq!(ids(&page), vec![3]);
    }

    #[test]
    fn test_column_filters_use_clause_routing() {
        let spec = RequestSpec::page(0, 10)
            .with_filter("category.name", FilterValue::text("sys"))
            .with_filter(
                "price",
                FilterValue::structured(
                    FilterOperator::Between,
                    Some(Operand::Many(vec![20i64.into(), 60i64.into()])),
                ),
            );
        let page = LocalPage::from_records(&records(), &spec, &[]);
        assert_eq!(ids(&page), vec![1, 5]);
        assert_eq!(page.total_items, 2);
    }

    #[test]
    fn test_null_checks_and_lists() {
        let spec = RequestSpec::page(0, 10)
            .with_filter("price", FilterValue::structured(FilterOperator::IsNull, None));
        assert_eq!(ids(&LocalPage::from_records(&records(), &spec, &[])), vec![3]);

        let spec = RequestSpec::page(0, 10).with_filter("id", FilterValue::one_of([2i64, 4i64]));
        assert_eq!(ids(&LocalPage::from_records(&records(), &spec, &[])), vec![2, 4]);
    }

    #[test]
    fn test_blank_filters_do_not_constrain() {
        let spec = RequestSpec::page(0, 10)
            .with_filter("title", FilterValue::text("  "))
            .with_global_filter("");
        let page = LocalPage::from_records(&records(), &spec, &["title".to_string()]);
        assert_eq!(page.total_items, 5);
    }
}
