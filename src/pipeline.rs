//! Pipeline Description Builder (C4)
//!
//! Declarative construction of a primitive-step DAG with hyperparameter
//! typing and inter-step wiring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, OrchestrationResult};

/// Closed set of hyperparameter value types. Anything else is rejected with
/// `UnsupportedHyperparameterType` (spec §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperparameterValue {
    Int64(i64),
    Bool(bool),
    String(String),
    /// Serialised as JSON when assembled into a step.
    ListOfString(Vec<String>),
}

impl HyperparameterValue {
    /// Decodes an untyped JSON value into the closed hyperparameter type set.
    /// This is the actual boundary spec §4.4 means by "any other type must be
    /// rejected": a pipeline step's hyperparameters arrive as arbitrary JSON
    /// (from a request body or an upstream primitive's default), and a JSON
    /// number written with a decimal point (e.g. `3.0`) decodes to a float,
    /// which has no variant here and is rejected rather than silently
    /// truncated to an int.
    pub fn decode(raw: &serde_json::Value) -> OrchestrationResult<Self> {
        match raw {
            serde_json::Value::Bool(b) => Ok(HyperparameterValue::Bool(*b)),
            serde_json::Value::String(s) => Ok(HyperparameterValue::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(HyperparameterValue::Int64).ok_or_else(|| {
                OrchestrationError::UnsupportedHyperparameterType(format!("number '{n}' is not a supported int64"))
            }),
            serde_json::Value::Array(items) => {
                let strings = items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => Ok(s.clone()),
                        other => Err(OrchestrationError::UnsupportedHyperparameterType(format!(
                            "list element '{other}' is not a string"
                        ))),
                    })
                    .collect::<OrchestrationResult<Vec<String>>>()?;
                Ok(HyperparameterValue::ListOfString(strings))
            }
            other => Err(OrchestrationError::UnsupportedHyperparameterType(other.to_string())),
        }
    }
}

/// A reference to an upstream value: either the pipeline input symbol or a
/// prior step's named output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamRef {
    PipelineInput(u32),
    StepOutput { step_index: usize, output: String },
}

impl UpstreamRef {
    pub fn symbol(&self) -> String {
        match self {
            UpstreamRef::PipelineInput(n) => format!("inputs.{n}"),
            UpstreamRef::StepOutput { step_index, output } => format!("steps.{step_index}.{output}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveStep {
    pub primitive_id: String,
    pub version: String,
    pub name: String,
    pub symbolic_path: String,
    pub arguments: HashMap<String, UpstreamRef>,
    pub hyperparameters: HashMap<String, HyperparameterValue>,
    pub output_methods: Vec<String>,
}

/// A step declaration as the caller supplies it, before argument wiring is
/// resolved by `PipelineBuilder::build`.
#[derive(Debug, Clone)]
pub struct StepDeclaration {
    pub primitive_id: String,
    pub version: String,
    pub name: String,
    pub symbolic_path: String,
    /// Extra arguments beyond the reserved `inputs` wiring; setting `inputs`
    /// here is a `ReservedArgument` violation.
    pub extra_arguments: HashMap<String, UpstreamRef>,
    /// Untyped JSON; decoded into [`HyperparameterValue`] by
    /// [`PipelineBuilder::add_step`], which is where an unrepresentable type
    /// (a float, an object, a mixed-type list) is rejected.
    pub hyperparameters: HashMap<String, serde_json::Value>,
    pub output_methods: Vec<String>,
}

/// A declaration after its hyperparameters have been decoded and validated.
struct DeclaredStep {
    primitive_id: String,
    version: String,
    name: String,
    symbolic_path: String,
    extra_arguments: HashMap<String, UpstreamRef>,
    hyperparameters: HashMap<String, HyperparameterValue>,
    output_methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub steps: Vec<PrimitiveStep>,
    /// The symbol bound to the last step's first output.
    pub output: String,
}

const RESERVED_INPUTS_ARG: &str = "inputs";

#[derive(Default)]
pub struct PipelineBuilder {
    declarations: Vec<DeclaredStep>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, declaration: StepDeclaration) -> OrchestrationResult<&mut Self> {
        if declaration.extra_arguments.contains_key(RESERVED_INPUTS_ARG) {
            return Err(OrchestrationError::InvalidRequest(format!(
                "ReservedArgument: step '{}' may not set '{RESERVED_INPUTS_ARG}'",
                declaration.name
            )));
        }
        let hyperparameters = declaration
            .hyperparameters
            .iter()
            .map(|(key, raw)| HyperparameterValue::decode(raw).map(|value| (key.clone(), value)))
            .collect::<OrchestrationResult<HashMap<_, _>>>()?;

        self.declarations.push(DeclaredStep {
            primitive_id: declaration.primitive_id,
            version: declaration.version,
            name: declaration.name,
            symbolic_path: declaration.symbolic_path,
            extra_arguments: declaration.extra_arguments,
            hyperparameters,
            output_methods: declaration.output_methods,
        });
        Ok(self)
    }

    /// Compiles the declared steps deterministically (spec §4.4 compilation
    /// rules 1-4): steps keep declaration order; step 0's `inputs` binds to
    /// `inputs.0`; each later step's `inputs` binds to
    /// `steps.<prev>.<prev_first_output>`; the pipeline output is the last
    /// step's first output.
    pub fn build(self) -> OrchestrationResult<PipelineDescription> {
        if self.declarations.is_empty() {
            return Err(OrchestrationError::InvalidRequest("pipeline has no steps".into()));
        }

        let mut steps = Vec::with_capacity(self.declarations.len());
        for (i, decl) in self.declarations.into_iter().enumerate() {
            let inputs_ref = if i == 0 {
                UpstreamRef::PipelineInput(0)
            } else {
                let prev: &PrimitiveStep = &steps[i - 1];
                let prev_output = prev
                    .output_methods
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "produce".to_string());
                UpstreamRef::StepOutput { step_index: i - 1, output: prev_output }
            };

            let mut arguments = decl.extra_arguments;
            arguments.insert(RESERVED_INPUTS_ARG.to_string(), inputs_ref);

            steps.push(PrimitiveStep {
                primitive_id: decl.primitive_id,
                version: decl.version,
                name: decl.name,
                symbolic_path: decl.symbolic_path,
                arguments,
                hyperparameters: decl.hyperparameters,
                output_methods: decl.output_methods,
            });
        }

        let last = steps.len() - 1;
        let output_method = steps[last].output_methods.first().cloned().unwrap_or_else(|| "produce".to_string());
        let output = UpstreamRef::StepOutput { step_index: last, output: output_method }.symbol();

        Ok(PipelineDescription { steps, output })
    }
}

/// Synthesises the user-dataset pipeline the engine drives before search:
/// dataset->dataframe conversion, semantic-type annotation updates,
/// column pruning to the selected training set, and row-level filter
/// application (spec §4.4 "used by the orchestration engine").
pub fn build_user_dataset_pipeline(
    selected_columns: &[String],
    type_reassignments: &[(String, String)],
    has_row_filters: bool,
) -> OrchestrationResult<PipelineDescription> {
    let mut builder = PipelineBuilder::new();

    builder.add_step(StepDeclaration {
        primitive_id: "d3m.primitives.data_transformation.dataset_to_dataframe.Common".into(),
        version: "0.3.0".into(),
        name: "dataset to dataframe".into(),
        symbolic_path: "steps.0".into(),
        extra_arguments: HashMap::new(),
        hyperparameters: HashMap::new(),
        output_methods: vec!["produce".to_string()],
    })?;

    if !type_reassignments.is_empty() {
        let pairs: Vec<String> = type_reassignments
            .iter()
            .map(|(key, ty)| format!("{key}={ty}"))
            .collect();
        let mut hp = HashMap::new();
        hp.insert("semantic_types".to_string(), serde_json::json!(pairs));
        builder.add_step(StepDeclaration {
            primitive_id: "d3m.primitives.schema_discovery.profiler.Common".into(),
            version: "0.2.0".into(),
            name: "semantic type annotation".into(),
            symbolic_path: "steps.1".into(),
            extra_arguments: HashMap::new(),
            hyperparameters: hp,
            output_methods: vec!["produce".to_string()],
        })?;
    }

    let mut hp = HashMap::new();
    hp.insert("columns".to_string(), serde_json::json!(selected_columns));
    builder.add_step(StepDeclaration {
        primitive_id: "d3m.primitives.data_transformation.column_selector.Common".into(),
        version: "0.1.0".into(),
        name: "column pruning".into(),
        symbolic_path: format!("steps.{}", selected_columns.len()),
        extra_arguments: HashMap::new(),
        hyperparameters: hp,
        output_methods: vec!["produce".to_string()],
    })?;

    if has_row_filters {
        builder.add_step(StepDeclaration {
            primitive_id: "d3m.primitives.data_transformation.row_filter.Common".into(),
            version: "0.1.0".into(),
            name: "row filter application".into(),
            symbolic_path: "steps.row_filter".into(),
            extra_arguments: HashMap::new(),
            hyperparameters: HashMap::new(),
            output_methods: vec!["produce".to_string()],
        })?;
    }

    builder.build()
}
