//! Parse emitted `filters[...]` parameters back into clauses.
//!
//! Values come back as text; the wire carries no type information.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Arity, FilterClause, FilterOperator, Operand, Scalar};

static FILTER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^filters((?:\[[^\[\]]*\])+)$").expect("static regex")
});

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("static regex"));

/// A filter recovered from a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    /// Index inside the `$or` group, for global search clauses
    pub or_group: Option<usize>,
    /// Dotted field path
    pub field: String,
    pub clause: FilterClause,
}

/// Collect every filter clause in `query`, in first-appearance order.
///
/// Unrecognized keys are skipped.
pub fn parse_filter_clauses(query: &str) -> Vec<ParsedFilter> {
    let mut parsed: Vec<(ParsedFilter, Vec<(usize, String)>)> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let Some(caps) = FILTER_KEY.captures(&key) else {
            continue;
        };
        let segments: Vec<&str> = SEGMENT
            .captures_iter(&caps[1])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let Some((or_group, field, operator, index)) = split_segments(&segments) else {
            continue;
        };

        let existing = parsed.iter().position(|(p, _)| {
            p.or_group == or_group && p.field == field && p.clause.operator == operator
        });
        let pos = match existing {
            Some(pos) => pos,
            None => {
                parsed.push((
                    ParsedFilter {
                        or_group,
                        field,
                        clause: FilterClause {
                            operator,
                            operand: None,
                        },
                    },
                    Vec::new(),
                ));
                parsed.len() - 1
            }
        };
        let entry = &mut parsed[pos];

        match (operator.arity(), index) {
            (Arity::Nullary, _) => {}
            (_, Some(i)) => entry.1.push((i, value.into_owned())),
            (_, None) => {
                entry.0.clause.operand = Some(Operand::One(Scalar::Text(value.into_owned())));
            }
        }
    }

    parsed
        .into_iter()
        .map(|(mut filter, mut items)| {
            if !items.is_empty() {
                items.sort_by_key(|(i, _)| *i);
                filter.clause.operand = Some(Operand::Many(
                    items.into_iter().map(|(_, v)| Scalar::Text(v)).collect(),
                ));
            }
            filter
        })
        .collect()
}

/// Split `[$or][n]?[path..][$op][i]?` into its parts.
fn split_segments(
    segments: &[&str],
) -> Option<(Option<usize>, String, FilterOperator, Option<usize>)> {
    let (or_group, rest) = match segments {
        ["$or", n, rest @ ..] => (Some(n.parse().ok()?), rest),
        _ => (None, segments),
    };
    let op_pos = rest.iter().rposition(|s| FilterOperator::from_wire(s).is_some())?;
    let operator = FilterOperator::from_wire(rest[op_pos])?;
    let path = &rest[..op_pos];
    if path.is_empty() {
        return None;
    }
    let index = match &rest[op_pos + 1..] {
        [] => None,
        [i] => Some(i.parse().ok()?),
        _ => return None,
    };
    Some((or_group, path.join("."), operator, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterValue, Populate, RequestSpec};
    use crate::query::build;

    fn as_text(operand: &Option<Operand>) -> Option<Operand> {
        operand.as_ref().map(|op| match op {
            Operand::One(v) => Operand::One(Scalar::Text(v.to_string())),
            Operand::Many(vs) => {
                Operand::Many(vs.iter().map(|v| Scalar::Text(v.to_string())).collect())
            }
        })
    }

    #[test]
    fn test_round_trip_every_valued_operator() {
        for operator in FilterOperator::ALL {
            let value = match operator.arity() {
                Arity::Nullary => continue,
                Arity::Unary => Operand::One(Scalar::Text("intro & more".into())),
                Arity::Variadic => Operand::Many(vec![3i64.into(), "7".into()]),
            };
            let spec = RequestSpec::default()
                .with_filter("category.name", FilterValue::structured(operator, Some(value.clone())));
            let query = build(&spec, &[], &Populate::None);
            let parsed = parse_filter_clauses(&query);

            assert_eq!(parsed.len(), 1, "operator {operator}");
            assert_eq!(parsed[0].field, "category.name");
            assert_eq!(parsed[0].clause.operator, operator);
            assert_eq!(parsed[0].clause.operand, as_text(&Some(value)));
        }
    }

    #[test]
    fn test_null_checks_parse_without_value() {
        let spec = RequestSpec::default()
            .with_filter("cover", FilterValue::structured(FilterOperator::IsNull, None));
        let parsed = parse_filter_clauses(&build(&spec, &[], &Populate::None));
        assert_eq!(parsed[0].clause.operator, FilterOperator::IsNull);
        assert_eq!(parsed[0].clause.operand, None);
    }

    #[test]
    fn test_or_group_is_reported() {
        let spec = RequestSpec::default().with_global_filter("rust");
        let fields = vec!["title".to_string(), "description".to_string()];
        let parsed = parse_filter_clauses(&build(&spec, &fields, &Populate::None));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].or_group, Some(1));
        assert_eq!(parsed[1].field, "description");
    }

    #[test]
    fn test_non_filter_keys_are_skipped() {
        let parsed = parse_filter_clauses("pagination[page]=1&sort=title:asc&filters[x]=1");
        assert!(parsed.is_empty());
    }
}
