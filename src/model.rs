//! Data Model
//!
//! Types shared by every component: `Variable`, `Dataset`, `Filter`, `Request`,
//! `Solution`, `SolutionResult`, `ResultRow`, and the virtual result columns
//! computed on top of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of semantic types a Variable's content can be inferred as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SemanticType {
    Integer,
    Float,
    Latitude,
    Longitude,
    Categorical,
    Ordinal,
    Boolean,
    Text,
    Address,
    City,
    State,
    Country,
    Email,
    Phone,
    PostalCode,
    Uri,
    Keyword,
    DateTime,
    Timeseries,
    Image,
    /// `cluster-of-<base>`; references a base variable by name prefix.
    ClusterOf(String),
    /// `feature-of-<base>`; references a base variable by name prefix.
    FeatureOf(String),
}

impl SemanticType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Float)
    }

    /// Cluster/feature variables are generated metadata columns and must
    /// never appear standalone in a user target selection.
    pub fn is_generated(&self) -> bool {
        matches!(self, SemanticType::ClusterOf(_) | SemanticType::FeatureOf(_))
    }
}

/// Distinguishes data columns from generated metadata columns and the
/// reserved index column. Exactly one Variable per dataset carries `Index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableRole {
    Index,
    Data,
    Cluster,
    Feature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub display_label: String,
    pub semantic_type: SemanticType,
    /// Importance score in `[0, 1]`.
    pub importance: f64,
    pub role: VariableRole,
}

impl Variable {
    pub fn is_index(&self) -> bool {
        self.role == VariableRole::Index
    }

    pub fn is_user_visible(&self) -> bool {
        matches!(self.role, VariableRole::Data | VariableRole::Index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    Seed,
    Contrib,
    Augmented,
}

/// Where a `Dataset` record was resolved from; surfaced so C3 stays
/// polymorphic over its backing catalogue/federated source/staging folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Catalogue,
    Federated,
    Staging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    /// The backing table name: normalised, lowercased, suffix-trimmed.
    pub storage_name: String,
    pub folder: String,
    pub source: DatasetSource,
    pub row_count: u64,
    pub byte_count: u64,
    pub variables: Vec<Variable>,
    pub provenance: Provenance,
}

impl Dataset {
    pub fn index_variable(&self) -> Option<&Variable> {
        self.variables.iter().find(|v| v.is_index())
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.key == key)
    }
}

/// `include` keeps matching rows; `exclude` drops them. Include and exclude
/// filters on the same key combine as `include ∩ ¬exclude`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Include,
    Exclude,
}

/// Tagged-union filter tree. Decoded once at the HTTP/ws boundary; downstream
/// code never re-inspects wire strings (see DESIGN.md, re-architecture notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Categorical {
        key: String,
        mode: FilterMode,
        category: Vec<String>,
    },
    Numerical {
        key: String,
        mode: FilterMode,
        min: f64,
        max: f64,
    },
    Bivariate {
        key: String,
        mode: FilterMode,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    },
    Row {
        mode: FilterMode,
        indices: Vec<i64>,
    },
    Feature {
        key: String,
        mode: FilterMode,
        category: Vec<String>,
    },
    Text {
        key: String,
        mode: FilterMode,
        substring: Vec<String>,
    },
}

impl Filter {
    /// The variable key this filter references, when it references one
    /// (`Row` filters reference the reserved index column implicitly).
    pub fn key(&self) -> Option<&str> {
        match self {
            Filter::Categorical { key, .. }
            | Filter::Numerical { key, .. }
            | Filter::Bivariate { key, .. }
            | Filter::Feature { key, .. }
            | Filter::Text { key, .. } => Some(key),
            Filter::Row { .. } => None,
        }
    }

    pub fn mode(&self) -> FilterMode {
        match self {
            Filter::Categorical { mode, .. }
            | Filter::Numerical { mode, .. }
            | Filter::Bivariate { mode, .. }
            | Filter::Row { mode, .. }
            | Filter::Feature { mode, .. }
            | Filter::Text { mode, .. } => *mode,
        }
    }

    /// True when `key` names a synthesised result column (`<target>:predicted`,
    /// `<target>:error`, `<target>:correctness`) rather than a dataset variable.
    pub fn is_result_filter(&self) -> bool {
        self.key()
            .map(|k| k.contains(":predicted") || k.contains(":error") || k.contains(":correctness"))
            .unwrap_or(false)
    }
}

/// A single (key, value) pair converted to a virtual include-filter for
/// summary queries on the fly. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightRoot {
    pub key: String,
    pub value: serde_json::Value,
}

impl HighlightRoot {
    /// Materialises the highlight as a virtual categorical include-filter.
    pub fn as_filter(&self) -> Filter {
        Filter::Categorical {
            key: self.key.clone(),
            mode: FilterMode::Include,
            category: vec![self.value.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterParams {
    pub size: usize,
    pub variables: Vec<String>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification,
    Regression,
    Clustering,
}

impl Task {
    /// The wire representation sent to the compute client's `ProblemDescription`.
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Classification => "classification",
            Task::Regression => "regression",
            Task::Clustering => "clustering",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    Pending,
    Running,
    Errored,
    Completed,
}

impl Progress {
    /// Monotonic progress invariant (spec testable property 2): the only
    /// legal successors of a state, used to guard against regression.
    pub fn can_transition_to(self, next: Progress) -> bool {
        use Progress::*;
        if next == self {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Errored) | (Running, Completed) | (Running, Errored)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub dataset_id: String,
    pub target: String,
    pub task: Task,
    pub sub_task: String,
    pub metrics: Vec<String>,
    pub max_solutions: u32,
    pub max_time_seconds: u64,
    pub filters: FilterParams,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub solution_id: String,
    pub request_id: String,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub scores: Vec<(String, f64)>,
    pub fitted_solution_id: Option<String>,
    pub result: Option<SolutionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionResult {
    /// sha1 of the produced file path.
    pub result_id: String,
    pub solution_id: String,
    pub fitted_solution_id: String,
    pub result_uri: String,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub predicted_key: String,
    pub error_key: String,
}

impl SolutionResult {
    pub fn predicted_key(target: &str, solution_id: &str) -> String {
        format!("{target}:predicted:{solution_id}")
    }

    pub fn error_key(target: &str, solution_id: &str) -> String {
        format!("{target}:error:{solution_id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub result_id: String,
    pub row_index: i64,
    pub target_name: String,
    /// Stored as text to preserve nested-array payloads verbatim; downstream
    /// parsing (see `ingest::parse_cell`) is lazy.
    pub value: String,
}

/// Virtual columns appended on demand to any result projection.
#[derive(Debug, Clone, Copy)]
pub enum VirtualColumn {
    Target,
    Predicted,
    /// Numerical targets only: `predicted - truth`.
    Error,
    /// Categorical targets only: `correct` / `incorrect`.
    Correctness,
}

impl VirtualColumn {
    pub fn column_name(self, target: &str) -> String {
        match self {
            VirtualColumn::Target => format!("{target}:target"),
            VirtualColumn::Predicted => format!("{target}:predicted"),
            VirtualColumn::Error => format!("{target}:error"),
            VirtualColumn::Correctness => format!("{target}:correctness"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_allows_forward_transitions_only() {
        assert!(Progress::Pending.can_transition_to(Progress::Running));
        assert!(Progress::Running.can_transition_to(Progress::Completed));
        assert!(Progress::Running.can_transition_to(Progress::Errored));
        assert!(!Progress::Completed.can_transition_to(Progress::Running));
        assert!(!Progress::Running.can_transition_to(Progress::Pending));
    }

    #[test]
    fn result_filter_detection() {
        let f = Filter::Numerical {
            key: "price:error".to_string(),
            mode: FilterMode::Include,
            min: -5.0,
            max: 5.0,
        };
        assert!(f.is_result_filter());

        let g = Filter::Numerical {
            key: "price".to_string(),
            mode: FilterMode::Include,
            min: 0.0,
            max: 100.0,
        };
        assert!(!g.is_result_filter());
    }

    #[test]
    fn synthesised_column_names() {
        assert_eq!(SolutionResult::predicted_key("price", "s1"), "price:predicted:s1");
        assert_eq!(SolutionResult::error_key("price", "s1"), "price:error:s1");
        assert_eq!(VirtualColumn::Correctness.column_name("species"), "species:correctness");
    }

    #[test]
    fn highlight_materialises_as_include_filter() {
        let hl = HighlightRoot { key: "region".to_string(), value: serde_json::json!("N") };
        let f = hl.as_filter();
        assert_eq!(f.mode(), FilterMode::Include);
        assert_eq!(f.key(), Some("region"));
    }
}
