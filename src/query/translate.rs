//! Request → query string translation.
//!
//! Emission order is fixed: pagination, sort, fields, populate, global
//! search, column filters, static filters, status. The backend treats every
//! segment independently, so the order only matters for byte-identical
//! output (cache keys, tests).

use crate::models::{FilterClause, FilterValue, Operand, Populate, RequestSpec};
use crate::query::params::{QueryParams, bracket_path};

/// Build the full query string for a request.
pub fn build(spec: &RequestSpec, fields: &[String], populate: &Populate) -> String {
    let mut params = QueryParams::new();
    push_pagination(&mut params, spec);
    push_sort(&mut params, spec);
    push_fields(&mut params, fields);
    push_populate(&mut params, populate);
    push_global_filter(&mut params, spec.global_filter.as_deref(), fields);
    push_column_filters(&mut params, spec);
    push_static_filters(&mut params, spec);
    push_status(&mut params, spec);
    params.encode()
}

/// The part of a query that defines *which* records and columns a dataset
/// holds: fields, populate, static filters, status.
pub fn selection(spec: &RequestSpec, fields: &[String], populate: &Populate) -> String {
    let mut params = QueryParams::new();
    push_fields(&mut params, fields);
    push_populate(&mut params, populate);
    push_static_filters(&mut params, spec);
    push_status(&mut params, spec);
    params.encode()
}

/// The part of a query the UI drives: pagination, sort, search, column
/// filters.
pub fn window(spec: &RequestSpec, fields: &[String]) -> String {
    let mut params = QueryParams::new();
    push_pagination(&mut params, spec);
    push_sort(&mut params, spec);
    push_global_filter(&mut params, spec.global_filter.as_deref(), fields);
    push_column_filters(&mut params, spec);
    params.encode()
}

fn push_pagination(params: &mut QueryParams, spec: &RequestSpec) {
    params.push("pagination[page]", (spec.page_index + 1).to_string());
    params.push(
        "pagination[pageSize]",
        spec.effective_page_size().to_string(),
    );
}

fn push_sort(params: &mut QueryParams, spec: &RequestSpec) {
    if let Some(entry) = spec.primary_sort() {
        params.push("sort", entry.to_wire());
    }
}

fn push_fields(params: &mut QueryParams, fields: &[String]) {
    for field in fields {
        params.push("fields[]", field);
    }
}

fn push_populate(params: &mut QueryParams, populate: &Populate) {
    match populate {
        Populate::None => {}
        Populate::Single(expr) if expr.is_empty() => {}
        Populate::Single(expr) => params.push("populate", expr),
        Populate::Many(relations) => {
            for relation in relations {
                params.push("populate[]", relation);
            }
        }
    }
}

/// One case-insensitive contains clause per field, OR-ed together.
fn push_global_filter(params: &mut QueryParams, text: Option<&str>, fields: &[String]) {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    for (n, field) in fields.iter().enumerate() {
        params.push(
            format!("filters[$or][{n}]{}[$containsi]", bracket_path(field)),
            text,
        );
    }
}

fn push_column_filters(params: &mut QueryParams, spec: &RequestSpec) {
    for filter in &spec.column_filters {
        push_filter(params, &filter.field_id, &filter.value);
    }
}

fn push_static_filters(params: &mut QueryParams, spec: &RequestSpec) {
    for (field_id, value) in &spec.static_filters {
        push_filter(params, field_id, value);
    }
}

fn push_status(params: &mut QueryParams, spec: &RequestSpec) {
    if let Some(status) = spec.status {
        params.push("status", status.as_str());
    }
}

/// Emit one filter; malformed values emit nothing.
fn push_filter(params: &mut QueryParams, field_id: &str, value: &FilterValue) {
    if let Some(clause) = value.to_clause() {
        push_clause(params, &format!("filters{}", bracket_path(field_id)), &clause);
    }
}

fn push_clause(params: &mut QueryParams, prefix: &str, clause: &FilterClause) {
    let key = format!("{prefix}[{}]", clause.operator.wire());
    match &clause.operand {
        None => params.push(key, "true"),
        Some(Operand::One(value)) => params.push(key, value.to_string()),
        Some(Operand::Many(values)) => {
            for (i, value) in values.iter().enumerate() {
                params.push(format!("{key}[{i}]"), value.to_string());
            }
        }
    }
}
