//! Invocation protocol
//!
//! Loads a named script from the store, evaluates it in a fresh environment,
//! binds the caller's parameters as data and calls a global function.
//!
//! Only a script's own functions are callable. The two bundled families accept
//! exactly their enum names; any other script accepts the global functions its
//! source declared. Intrinsics such as `eval` or `Function` are never reachable,
//! and an unknown name is an evaluation error.
//!
//! Two calling conventions exist:
//!
//! - business rules: `fn(params)`
//! - data processing: `fn(inputData, options)`, `options` defaulting to `{}`
//!
//! The data-processing convention applies to the `data-processing` script;
//! every other script is called with the business-rules convention.

use jsembed_common::{Bindings, EmbedError, ExecutionResult, FunctionCall, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::Engine;
use crate::store::ScriptStore;

/// Script holding the business-rule family.
pub const BUSINESS_RULES_SCRIPT: &str = "business-rules";
/// Script holding the data-processing family.
pub const DATA_PROCESSING_SCRIPT: &str = "data-processing";

/// How parameters are handed to the called function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallingConvention {
    /// `fn(params)`
    BusinessRule,
    /// `fn(inputData, options)`
    DataProcessing,
}

impl CallingConvention {
    pub fn for_script(script: &str) -> Self {
        if script == DATA_PROCESSING_SCRIPT {
            CallingConvention::DataProcessing
        } else {
            CallingConvention::BusinessRule
        }
    }

    /// Global names the parameters are bound under, in argument order.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            CallingConvention::BusinessRule => &["params"],
            CallingConvention::DataProcessing => &["inputData", "options"],
        }
    }
}

/// The closed set of functions in `business-rules`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessRule {
    CalculateAdvancedDiscount,
    ValidateComplexForm,
    AnalyzeData,
}

impl BusinessRule {
    pub const ALL: [BusinessRule; 3] = [
        BusinessRule::CalculateAdvancedDiscount,
        BusinessRule::ValidateComplexForm,
        BusinessRule::AnalyzeData,
    ];

    pub fn function_name(&self) -> &'static str {
        match self {
            BusinessRule::CalculateAdvancedDiscount => "calculateAdvancedDiscount",
            BusinessRule::ValidateComplexForm => "validateComplexForm",
            BusinessRule::AnalyzeData => "analyzeData",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BusinessRule::CalculateAdvancedDiscount => "Advanced discount calculation with multiple rules",
            BusinessRule::ValidateComplexForm => "Complex form validation with warnings and errors",
            BusinessRule::AnalyzeData => "Statistical analysis of numerical datasets",
        }
    }
}

impl fmt::Display for BusinessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

impl FromStr for BusinessRule {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.function_name() == s)
            .ok_or_else(|| EmbedError::InvalidRequest(format!("Unknown business rule: {}", s)))
    }
}

/// The closed set of functions in `data-processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOperation {
    ParseCsv,
    QueryJson,
    CleanData,
    AggregateData,
    ProcessTimeSeries,
}

impl DataOperation {
    pub const ALL: [DataOperation; 5] = [
        DataOperation::ParseCsv,
        DataOperation::QueryJson,
        DataOperation::CleanData,
        DataOperation::AggregateData,
        DataOperation::ProcessTimeSeries,
    ];

    pub fn function_name(&self) -> &'static str {
        match self {
            DataOperation::ParseCsv => "parseCSV",
            DataOperation::QueryJson => "queryJSON",
            DataOperation::CleanData => "cleanData",
            DataOperation::AggregateData => "aggregateData",
            DataOperation::ProcessTimeSeries => "processTimeSeries",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DataOperation::ParseCsv => "Parse CSV data with configurable options",
            DataOperation::QueryJson => "Query JSON data using path syntax",
            DataOperation::CleanData => "Data cleaning and transformation with rules",
            DataOperation::AggregateData => "Group and aggregate data with multiple functions",
            DataOperation::ProcessTimeSeries => "Time series data analysis and aggregation",
        }
    }
}

impl fmt::Display for DataOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

impl FromStr for DataOperation {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.function_name() == s)
            .ok_or_else(|| EmbedError::InvalidRequest(format!("Unknown data operation: {}", s)))
    }
}

/// One function in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub script: String,
    pub function: String,
    pub description: String,
}

/// The typed function families and what each function does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub business_rules: Vec<CatalogEntry>,
    pub data_processing: Vec<CatalogEntry>,
}

pub fn catalog() -> Catalog {
    let entry = |script: &str, function: &str, description: &str| CatalogEntry {
        script: script.to_string(),
        function: function.to_string(),
        description: description.to_string(),
    };

    Catalog {
        business_rules: BusinessRule::ALL
            .iter()
            .map(|r| entry(BUSINESS_RULES_SCRIPT, r.function_name(), r.description()))
            .collect(),
        data_processing: DataOperation::ALL
            .iter()
            .map(|op| entry(DATA_PROCESSING_SCRIPT, op.function_name(), op.description()))
            .collect(),
    }
}

/// A call of `function` from the script named `script`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub script: String,
    pub function: String,
    /// Named parameters, passed to the function as one mapping.
    pub params: Bindings,
    /// Second argument under the data-processing convention. Ignored by
    /// business rules.
    pub options: Option<Bindings>,
}

impl Invocation {
    pub fn new(script: impl Into<String>, function: impl Into<String>, params: Bindings) -> Self {
        Self {
            script: script.into(),
            function: function.into(),
            params,
            options: None,
        }
    }

    pub fn business_rule(rule: BusinessRule, params: Bindings) -> Self {
        Self::new(BUSINESS_RULES_SCRIPT, rule.function_name(), params)
    }

    pub fn data_operation(op: DataOperation, input: Bindings) -> Self {
        Self::new(DATA_PROCESSING_SCRIPT, op.function_name(), input)
    }

    pub fn with_options(mut self, options: Bindings) -> Self {
        self.options = Some(options);
        self
    }

    /// `script.function`, the key invocations are recorded under.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.script, self.function)
    }

    pub fn convention(&self) -> CallingConvention {
        CallingConvention::for_script(&self.script)
    }

    fn arguments(&self) -> Vec<Value> {
        let params = Value::Object(self.params.clone());
        match self.convention() {
            CallingConvention::BusinessRule => vec![params],
            CallingConvention::DataProcessing => {
                vec![params, Value::Object(self.options.clone().unwrap_or_default())]
            }
        }
    }

    /// Whether the script's family could hold `function`.
    ///
    /// `None` for scripts outside the two bundled families, whose callable set
    /// is only known once the script has run.
    fn family_admits(&self) -> Option<bool> {
        match self.script.as_str() {
            BUSINESS_RULES_SCRIPT => Some(self.function.parse::<BusinessRule>().is_ok()),
            DATA_PROCESSING_SCRIPT => Some(self.function.parse::<DataOperation>().is_ok()),
            _ => None,
        }
    }

    fn undefined_function(&self) -> EmbedError {
        EmbedError::Evaluation(format!(
            "undefined function '{}' in script '{}'",
            self.function, self.script
        ))
    }
}

/// Runs `invocation` against `store` on `engine`.
///
/// A missing script is `ScriptNotFound` and nothing is evaluated. The
/// function name must be a plain identifier, belong to the script's family
/// and be declared by the script itself.
pub fn invoke(store: &ScriptStore, engine: &Engine, invocation: &Invocation) -> ExecutionResult {
    FunctionCall::new(invocation.function.as_str()).validate()?;

    let script = store
        .load(&invocation.script)?
        .ok_or_else(|| EmbedError::ScriptNotFound(invocation.script.clone()))?;

    if invocation.family_admits() == Some(false) {
        return Err(invocation.undefined_function());
    }

    tracing::debug!("Invoking {}", invocation.qualified_name());
    let convention = invocation.convention();
    let arguments = invocation.arguments();
    let undefined = invocation.undefined_function();
    let function = invocation.function.clone();

    engine.with_environment(move |env| {
        let declared = env.load_library(script.text())?;
        if !declared.contains(&function) {
            return Err(undefined);
        }

        for (name, value) in convention.parameter_names().iter().zip(&arguments) {
            env.bind(name, value)?;
        }
        env.call(&function, &arguments)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{DirectoryResources, EmbeddedResources};
    use jsembed_common::{to_bindings, ErrorKind, Output};
    use serde_json::json;

    fn setup() -> (ScriptStore, Engine) {
        (ScriptStore::new(EmbeddedResources), Engine::default())
    }

    fn params(value: Value) -> Bindings {
        to_bindings(value).unwrap()
    }

    #[test]
    fn test_calling_conventions() {
        assert_eq!(
            CallingConvention::for_script("data-processing"),
            CallingConvention::DataProcessing
        );
        assert_eq!(
            CallingConvention::for_script("business-rules"),
            CallingConvention::BusinessRule
        );
        assert_eq!(
            CallingConvention::for_script("math-utils"),
            CallingConvention::BusinessRule
        );
    }

    #[test]
    fn test_family_names_parse() {
        for rule in BusinessRule::ALL {
            assert_eq!(rule.function_name().parse::<BusinessRule>().unwrap(), rule);
        }
        for op in DataOperation::ALL {
            assert_eq!(op.to_string().parse::<DataOperation>().unwrap(), op);
        }
        let err = "parseXML".parse::<DataOperation>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_catalog() {
        let catalog = catalog();
        assert_eq!(catalog.business_rules.len(), 3);
        assert_eq!(catalog.data_processing.len(), 5);
        assert!(catalog
            .data_processing
            .iter()
            .any(|e| e.function == "parseCSV" && e.description.contains("CSV")));
    }

    #[test]
    fn test_qualified_name() {
        let invocation = Invocation::business_rule(BusinessRule::AnalyzeData, params(json!({"dataset": [1, 2]})));
        assert_eq!(invocation.qualified_name(), "business-rules.analyzeData");
    }

    #[test]
    fn test_invoke_discount() {
        let (store, engine) = setup();
        let invocation = Invocation::business_rule(
            BusinessRule::CalculateAdvancedDiscount,
            params(json!({"price": 100.0, "quantity": 15, "customerTier": "gold"})),
        );

        let output = invoke(&store, &engine, &invocation).unwrap();
        let value = output.as_structured().unwrap();
        assert!(value["finalPrice"].as_f64().unwrap() < 1500.0, "{value}");
    }

    #[test]
    fn test_invoke_parse_csv() {
        let (store, engine) = setup();
        let invocation = Invocation::data_operation(
            DataOperation::ParseCsv,
            params(json!({"csvText": "Name,Age\nJohn,30", "hasHeader": true})),
        );

        let output = invoke(&store, &engine, &invocation).unwrap();
        let value = output.as_structured().unwrap();
        assert_eq!(value["rows"][0], json!({"Name": "John", "Age": "30"}));
    }

    #[test]
    fn test_invoke_with_options() {
        let (store, engine) = setup();
        let mut options = Bindings::new();
        options.insert("delimiter".into(), json!(";"));
        let invocation =
            Invocation::data_operation(DataOperation::ParseCsv, params(json!({"csvText": "a;b\n1;2"})))
                .with_options(options);

        let output = invoke(&store, &engine, &invocation).unwrap();
        assert_eq!(output.as_structured().unwrap()["rows"][0], json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_params_are_not_spliced() {
        let (store, engine) = setup();
        let invocation = Invocation::data_operation(
            DataOperation::ParseCsv,
            params(json!({"csvText": "quote\n\"'); throw 1; ('"})),
        );
        assert!(invoke(&store, &engine, &invocation).is_ok());
    }

    #[test]
    fn test_missing_script() {
        let (store, engine) = setup();
        let err = invoke(&store, &engine, &Invocation::new("nope", "f", Bindings::new())).unwrap_err();
        assert!(matches!(err, EmbedError::ScriptNotFound(ref name) if name == "nope"));
        assert_eq!(engine.live_environments(), 0);
    }

    #[test]
    fn test_missing_function() {
        let (store, engine) = setup();
        let err = invoke(
            &store,
            &engine,
            &Invocation::new("business-rules", "noSuchFunction", Bindings::new()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert!(err.to_string().contains("noSuchFunction"), "{err}");
        assert_eq!(engine.live_environments(), 0);
    }

    #[test]
    fn test_intrinsics_are_not_invocable() {
        let (store, engine) = setup();
        for script in ["business-rules", "data-processing", "math-utils"] {
            for function in ["eval", "Function", "Object", "hostUtils", "params"] {
                let invocation = Invocation::new(script, function, params(json!({"code": "1"})));
                let err = invoke(&store, &engine, &invocation).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Evaluation, "{script}.{function}");
                assert!(err.to_string().contains("undefined function"), "{err}");
            }
        }
    }

    #[test]
    fn test_family_helpers_are_not_invocable() {
        let (store, engine) = setup();
        for (script, helper) in [("business-rules", "validationScore"), ("data-processing", "payloadOf")] {
            let err = invoke(&store, &engine, &Invocation::new(script, helper, Bindings::new())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Evaluation, "{script}.{helper}");
        }
    }

    #[test]
    fn test_directory_script_exposes_declared_functions_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("custom.js"),
            "function greet(p) { return 'hi ' + p.name; }\nvar table = { greet: greet };",
        )
        .unwrap();
        let store = ScriptStore::new(DirectoryResources::new(dir.path()));
        let engine = Engine::default();

        let output = invoke(&store, &engine, &Invocation::new("custom", "greet", params(json!({"name": "Ann"}))))
            .unwrap();
        assert_eq!(output, Output::String("hi Ann".into()));

        for function in ["eval", "table", "parseInt"] {
            let err = invoke(&store, &engine, &Invocation::new("custom", function, Bindings::new())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Evaluation, "{function}");
        }
    }

    #[test]
    fn test_function_name_must_be_identifier() {
        let (store, engine) = setup();
        let err = invoke(
            &store,
            &engine,
            &Invocation::new("business-rules", "analyzeData(); while(true){}", Bindings::new()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_math_utils_calculate() {
        let (store, engine) = setup();
        let invocation = Invocation::new(
            "math-utils",
            "calculate",
            params(json!({"namespace": "Statistics", "operation": "mean", "args": [[1, 2, 3, 4]]})),
        );
        let output = invoke(&store, &engine, &invocation).unwrap();
        assert_eq!(output, Output::Number(2.5));
    }
}
