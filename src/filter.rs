//! Filter Model (C1)
//!
//! Structured filter/highlight tree; compilation to SQL predicates and to
//! pipeline column-selection steps.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::{Dataset, Filter, FilterMode, Variable};

/// An appended SQL parameter, in evaluation order. `sqlx` binds these
/// positionally ($1, $2, ...) when the gateway executes the query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Float(f64),
    Int(i64),
}

/// Generic filters (reference dataset variables) split out from the three
/// result-derived filter families, each of which may appear at most once.
#[derive(Debug, Default)]
pub struct SplitFilters<'a> {
    pub generic: Vec<&'a Filter>,
    pub predicted: Option<&'a Filter>,
    pub residual: Option<&'a Filter>,
    pub correctness: Option<&'a Filter>,
}

/// Compiles a conjunction of parameterised predicates starting the parameter
/// cursor at `params_cursor` (1-based, matching sqlx/Postgres `$n` binding).
/// Returns the `WHERE`-clause fragment (without the `WHERE` keyword; empty
/// when there are no filters) and the ordered parameters to append.
pub fn compile_where(
    filters: &[Filter],
    dataset: &Dataset,
    params_cursor: usize,
) -> OrchestrationResult<(String, Vec<SqlParam>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut cursor = params_cursor;

    for filter in filters {
        let (clause, consumed) = compile_one(filter, dataset, cursor)?;
        cursor += consumed.len();
        params.extend(consumed);
        clauses.push(clause);
    }

    Ok((clauses.join(" AND "), params))
}

fn resolve_variable<'a>(dataset: &'a Dataset, key: &str) -> OrchestrationResult<&'a Variable> {
    dataset
        .variable(key)
        .ok_or_else(|| OrchestrationError::InvalidFilter(format!("unknown variable key: {key}")))
}

fn compile_one(
    filter: &Filter,
    dataset: &Dataset,
    cursor: usize,
) -> OrchestrationResult<(String, Vec<SqlParam>)> {
    match filter {
        Filter::Categorical { key, mode, category } => {
            let _ = resolve_variable(dataset, key)?;
            let placeholders: Vec<String> = (0..category.len())
                .map(|i| format!("${}", cursor + i))
                .collect();
            let op = match mode {
                FilterMode::Include => "IN",
                FilterMode::Exclude => "NOT IN",
            };
            let clause = format!("\"{key}\" {op} ({})", placeholders.join(", "));
            let params = category.iter().cloned().map(SqlParam::Text).collect();
            Ok((clause, params))
        }
        Filter::Numerical { key, mode, min, max } => {
            let _ = resolve_variable(dataset, key)?;
            let (ge, le) = match mode {
                FilterMode::Include => (">=", "<="),
                FilterMode::Exclude => ("<", ">"),
            };
            let join = match mode {
                FilterMode::Include => "AND",
                FilterMode::Exclude => "OR",
            };
            let clause = format!(
                "(cast(\"{key}\" as double precision) {ge} ${c1} {join} cast(\"{key}\" as double precision) {le} ${c2})",
                c1 = cursor,
                c2 = cursor + 1,
            );
            Ok((clause, vec![SqlParam::Float(*min), SqlParam::Float(*max)]))
        }
        Filter::Bivariate { key, mode, min_x, max_x, min_y, max_y } => {
            let (xkey, ykey) = split_bivariate_key(key)?;
            let (x_expr, y_expr) = if dataset.variable(key).is_some() {
                // Array-typed `[lat,lon]` column layout.
                (format!("(\"{key}\")[1]"), format!("(\"{key}\")[2]"))
            } else {
                resolve_variable(dataset, &xkey)?;
                resolve_variable(dataset, &ykey)?;
                (format!("\"{xkey}\""), format!("\"{ykey}\""))
            };
            let in_box = format!(
                "(cast({x_expr} as double precision) BETWEEN ${c1} AND ${c2} AND cast({y_expr} as double precision) BETWEEN ${c3} AND ${c4})",
                c1 = cursor, c2 = cursor + 1, c3 = cursor + 2, c4 = cursor + 3,
            );
            let clause = match mode {
                FilterMode::Include => in_box,
                FilterMode::Exclude => format!("NOT {in_box}"),
            };
            Ok((
                clause,
                vec![
                    SqlParam::Float(*min_x),
                    SqlParam::Float(*max_x),
                    SqlParam::Float(*min_y),
                    SqlParam::Float(*max_y),
                ],
            ))
        }
        Filter::Row { mode, indices } => {
            let index_key = dataset
                .index_variable()
                .ok_or_else(|| OrchestrationError::InvalidFilter("dataset has no index column".into()))?
                .key
                .clone();
            let placeholders: Vec<String> = (0..indices.len())
                .map(|i| format!("${}", cursor + i))
                .collect();
            let op = match mode {
                FilterMode::Include => "IN",
                FilterMode::Exclude => "NOT IN",
            };
            let clause = format!("\"{index_key}\" {op} ({})", placeholders.join(", "));
            let params = indices.iter().map(|i| SqlParam::Int(*i)).collect();
            Ok((clause, params))
        }
        Filter::Feature { key, mode, category } => {
            let _ = resolve_variable(dataset, key)?;
            let placeholders: Vec<String> = (0..category.len())
                .map(|i| format!("lower(${})", cursor + i))
                .collect();
            let op = match mode {
                FilterMode::Include => "IN",
                FilterMode::Exclude => "NOT IN",
            };
            let clause = format!("lower(\"{key}\") {op} ({})", placeholders.join(", "));
            let params = category.iter().cloned().map(SqlParam::Text).collect();
            Ok((clause, params))
        }
        Filter::Text { key, mode, substring } => {
            let _ = resolve_variable(dataset, key)?;
            let clauses: Vec<String> = (0..substring.len())
                .map(|i| format!("\"{key}\" ILIKE ${}", cursor + i))
                .collect();
            let body = clauses.join(" OR ");
            let clause = match mode {
                FilterMode::Include => format!("({body})"),
                FilterMode::Exclude => format!("NOT ({body})"),
            };
            let params = substring
                .iter()
                .map(|s| SqlParam::Text(format!("%{s}%")))
                .collect();
            Ok((clause, params))
        }
    }
}

fn split_bivariate_key(key: &str) -> OrchestrationResult<(String, String)> {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() > 2 {
        return Err(OrchestrationError::InvalidFilter(format!(
            "bivariate key '{key}' has {} ':'-separated components, expected at most 2",
            parts.len()
        )));
    }
    match (parts.first(), parts.get(1)) {
        (Some(x), Some(y)) if !x.is_empty() && !y.is_empty() => Ok((x.to_string(), y.to_string())),
        _ => Ok((key.to_string(), key.to_string())),
    }
}

/// Compiles a single predicted/residual/correctness filter against a raw SQL
/// expression standing in for its column (e.g. `r.value`, or the residual
/// difference expression) — these reference a synthesised result column, not
/// a dataset variable, so [`compile_one`] can't resolve them by key.
pub fn compile_result_filter(filter: &Filter, expr: &str, cursor: usize) -> OrchestrationResult<(String, Vec<SqlParam>)> {
    match filter {
        Filter::Numerical { mode, min, max, .. } => {
            let (ge, le) = match mode {
                FilterMode::Include => (">=", "<="),
                FilterMode::Exclude => ("<", ">"),
            };
            let join = match mode {
                FilterMode::Include => "AND",
                FilterMode::Exclude => "OR",
            };
            let clause = format!("({expr} {ge} ${c1} {join} {expr} {le} ${c2})", c1 = cursor, c2 = cursor + 1);
            Ok((clause, vec![SqlParam::Float(*min), SqlParam::Float(*max)]))
        }
        Filter::Categorical { mode, category, .. } => {
            let placeholders: Vec<String> = (0..category.len()).map(|i| format!("${}", cursor + i)).collect();
            let op = match mode {
                FilterMode::Include => "IN",
                FilterMode::Exclude => "NOT IN",
            };
            let clause = format!("{expr} {op} ({})", placeholders.join(", "));
            Ok((clause, category.iter().cloned().map(SqlParam::Text).collect()))
        }
        other => Err(OrchestrationError::InvalidFilter(format!(
            "result-derived filters must be numerical (residual) or categorical (predicted/correctness); got {other:?}"
        ))),
    }
}

/// The target variable a predicted/residual/correctness filter's key names
/// (`<target>:predicted`, `<target>:error`, `<target>:correctness`).
pub fn result_filter_target(filter: &Filter) -> Option<&str> {
    filter.key().and_then(|key| key.rsplit_once(':')).map(|(target, _)| target)
}

/// Separates filters whose key refers to a synthesised result column from
/// generic dataset-variable filters. At most one predicted/residual/
/// correctness filter is allowed; more is a contract violation.
pub fn split_result_filters(filters: &[Filter]) -> OrchestrationResult<SplitFilters<'_>> {
    let mut split = SplitFilters::default();
    for filter in filters {
        let Some(key) = filter.key() else {
            split.generic.push(filter);
            continue;
        };
        if key.contains(":predicted") {
            if split.predicted.is_some() {
                return Err(OrchestrationError::InvalidFilter(
                    "at most one predicted filter is allowed".into(),
                ));
            }
            split.predicted = Some(filter);
        } else if key.contains(":error") {
            if split.residual.is_some() {
                return Err(OrchestrationError::InvalidFilter(
                    "at most one residual filter is allowed".into(),
                ));
            }
            split.residual = Some(filter);
        } else if key.contains(":correctness") {
            if split.correctness.is_some() {
                return Err(OrchestrationError::InvalidFilter(
                    "at most one correctness filter is allowed".into(),
                ));
            }
            split.correctness = Some(filter);
        } else {
            split.generic.push(filter);
        }
    }
    Ok(split)
}

/// Produces the projection list: every variable key referenced by a filter
/// plus the params' explicit `variables`. The index column is always
/// appended when absent.
pub fn to_column_selection(filters: &[Filter], dataset: &Dataset) -> Vec<String> {
    let mut selected: Vec<String> = dataset
        .variables
        .iter()
        .filter(|v| v.is_user_visible())
        .map(|v| v.key.clone())
        .filter(|key| filters.iter().any(|f| f.key() == Some(key.as_str())))
        .collect();

    if let Some(index) = dataset.index_variable() {
        if !selected.iter().any(|k| k == &index.key) {
            selected.push(index.key.clone());
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatasetSource, Provenance, SemanticType, VariableRole};
    use proptest::prelude::*;

    fn dataset() -> Dataset {
        Dataset {
            id: "iris".into(),
            storage_name: "iris".into(),
            folder: "/data/iris".into(),
            source: DatasetSource::Seed,
            row_count: 150,
            byte_count: 4096,
            provenance: Provenance::Catalogue,
            variables: vec![
                Variable {
                    key: "d3mIndex".into(),
                    display_label: "index".into(),
                    semantic_type: SemanticType::Integer,
                    importance: 0.0,
                    role: VariableRole::Index,
                },
                Variable {
                    key: "species".into(),
                    display_label: "species".into(),
                    semantic_type: SemanticType::Categorical,
                    importance: 1.0,
                    role: VariableRole::Data,
                },
                Variable {
                    key: "price".into(),
                    display_label: "price".into(),
                    semantic_type: SemanticType::Float,
                    importance: 0.8,
                    role: VariableRole::Data,
                },
            ],
        }
    }

    #[test]
    fn unknown_key_is_invalid_filter() {
        let filters = vec![Filter::Categorical {
            key: "ghost".into(),
            mode: FilterMode::Include,
            category: vec!["a".into()],
        }];
        let err = compile_where(&filters, &dataset(), 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidFilter);
    }

    #[test]
    fn categorical_include_and_exclude_use_opposite_operators() {
        let include = Filter::Categorical {
            key: "species".into(),
            mode: FilterMode::Include,
            category: vec!["setosa".into()],
        };
        let exclude = Filter::Categorical {
            key: "species".into(),
            mode: FilterMode::Exclude,
            category: vec!["setosa".into()],
        };
        let (inc_sql, _) = compile_where(&[include], &dataset(), 1).unwrap();
        let (exc_sql, _) = compile_where(&[exclude], &dataset(), 1).unwrap();
        assert!(inc_sql.contains(" IN "));
        assert!(exc_sql.contains(" NOT IN "));
    }

    #[test]
    fn numerical_casts_to_double() {
        let f = Filter::Numerical { key: "price".into(), mode: FilterMode::Include, min: 0.0, max: 100.0 };
        let (sql, params) = compile_where(&[f], &dataset(), 1).unwrap();
        assert!(sql.contains("cast(\"price\" as double precision)"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn split_rejects_two_residual_filters() {
        let filters = vec![
            Filter::Numerical { key: "price:error".into(), mode: FilterMode::Include, min: -5.0, max: 5.0 },
            Filter::Numerical { key: "price:error".into(), mode: FilterMode::Include, min: -1.0, max: 1.0 },
        ];
        let err = split_result_filters(&filters).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidFilter);
    }

    #[test]
    fn bivariate_three_component_key_is_invalid_filter() {
        let f = Filter::Bivariate {
            key: "x:y:z".into(),
            mode: FilterMode::Include,
            min_x: 0.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
        };
        let err = compile_where(std::slice::from_ref(&f), &dataset(), 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidFilter);
    }

    #[test]
    fn bivariate_two_component_key_splits_on_colon() {
        let (x, y) = split_bivariate_key("lat:lon").unwrap();
        assert_eq!(x, "lat");
        assert_eq!(y, "lon");
    }

    #[test]
    fn column_selection_always_includes_index() {
        let filters = vec![Filter::Categorical {
            key: "species".into(),
            mode: FilterMode::Include,
            category: vec!["setosa".into()],
        }];
        let cols = to_column_selection(&filters, &dataset());
        assert!(cols.iter().any(|c| c == "d3mIndex"));
        assert!(cols.iter().any(|c| c == "species"));
    }

    proptest::proptest! {
        #[test]
        fn split_never_panics_on_arbitrary_keys(key in "\\PC*") {
            let _ = split_bivariate_key(&key);
        }

        #[test]
        fn split_rejects_any_key_with_more_than_one_colon(
            x in "[a-zA-Z0-9]{1,8}", y in "[a-zA-Z0-9]{1,8}", z in "[a-zA-Z0-9]{1,8}"
        ) {
            let key = format!("{x}:{y}:{z}");
            prop_assert!(split_bivariate_key(&key).is_err());
        }

        #[test]
        fn split_round_trips_well_formed_two_component_keys(
            x in "[a-zA-Z0-9]{1,8}", y in "[a-zA-Z0-9]{1,8}"
        ) {
            let key = format!("{x}:{y}");
            let (got_x, got_y) = split_bivariate_key(&key).unwrap();
            prop_assert_eq!(got_x, x);
            prop_assert_eq!(got_y, y);
        }
    }
}
