//! Business-logic mode
//!
//! Built-in scripts that run whole instead of through a function call. The
//! caller's input is bound as `inputData`, an empty `result` object is bound
//! next to it, and whatever the script leaves in `result` is the answer.

use jsembed_common::{type_name, Bindings, EmbedError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::Engine;

/// Global the caller's input is bound under.
pub const INPUT_BINDING: &str = "inputData";
/// Global the script writes its answer into.
pub const RESULT_BINDING: &str = "result";

/// The built-in business-logic scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessLogic {
    CalculateDiscount,
    ValidateUserData,
}

impl BusinessLogic {
    pub const ALL: [BusinessLogic; 2] = [BusinessLogic::CalculateDiscount, BusinessLogic::ValidateUserData];

    pub fn name(&self) -> &'static str {
        match self {
            BusinessLogic::CalculateDiscount => "calculateDiscount",
            BusinessLogic::ValidateUserData => "validateUserData",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BusinessLogic::CalculateDiscount => {
                "Calculate discount based on price, quantity, and customer type"
            }
            BusinessLogic::ValidateUserData => "Validate user registration data",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            BusinessLogic::CalculateDiscount => include_str!("../scripts/logic/calculateDiscount.js"),
            BusinessLogic::ValidateUserData => include_str!("../scripts/logic/validateUserData.js"),
        }
    }
}

impl fmt::Display for BusinessLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BusinessLogic {
    type Err = EmbedError;

    /// Unknown names are `ScriptNotFound`.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|logic| logic.name() == s)
            .ok_or_else(|| EmbedError::ScriptNotFound(s.to_string()))
    }
}

/// One entry of the business-logic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicEntry {
    pub name: String,
    pub description: String,
}

pub fn listing() -> Vec<LogicEntry> {
    BusinessLogic::ALL
        .iter()
        .map(|logic| LogicEntry {
            name: logic.name().to_string(),
            description: logic.description().to_string(),
        })
        .collect()
}

/// Runs `logic` over `input` and returns the members of `result`.
///
/// # Errors
///
/// Script failures as usual; `Evaluation` if the script replaced `result`
/// with something other than a mapping.
pub fn run_business_logic(engine: &Engine, logic: BusinessLogic, input: Bindings) -> Result<Bindings> {
    tracing::debug!("Running business logic '{}'", logic);

    engine.with_environment(move |env| {
        env.bind(INPUT_BINDING, &Value::Object(input))?;
        env.bind(RESULT_BINDING, &Value::Object(Bindings::new()))?;
        env.load(logic.source())?;

        match env.global(RESULT_BINDING)? {
            Value::Object(members) => Ok(members),
            other => Err(EmbedError::Evaluation(format!(
                "'{}' must remain a mapping, got {}",
                RESULT_BINDING,
                type_name(&other)
            ))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsembed_common::{to_bindings, ErrorKind};
    use serde_json::json;

    fn run(logic: BusinessLogic, input: Value) -> Bindings {
        run_business_logic(&Engine::default(), logic, to_bindings(input).unwrap()).unwrap()
    }

    #[test]
    fn test_names_parse() {
        for logic in BusinessLogic::ALL {
            assert_eq!(logic.name().parse::<BusinessLogic>().unwrap(), logic);
        }
        let err = "calculateTax".parse::<BusinessLogic>().unwrap_err();
        assert!(matches!(err, EmbedError::ScriptNotFound(ref name) if name == "calculateTax"));
        assert_eq!(err.kind(), ErrorKind::ScriptNotFound);
    }

    #[test]
    fn test_listing() {
        let entries = listing();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "calculateDiscount");
        assert!(entries[1].description.contains("registration"));
    }

    #[test]
    fn test_sources_read_input_and_fill_result() {
        for logic in BusinessLogic::ALL {
            assert!(logic.source().contains(INPUT_BINDING), "{logic}");
            assert!(logic.source().contains(RESULT_BINDING), "{logic}");
        }
    }

    #[test]
    fn test_premium_discount() {
        let result = run(
            BusinessLogic::CalculateDiscount,
            json!({"price": 100, "quantity": 2, "customerType": "premium"}),
        );
        assert_eq!(result["originalTotal"], json!(200));
        assert_eq!(result["discount"], json!(0.15));
        assert!((result["finalPrice"].as_f64().unwrap() - 170.0).abs() < 1e-9);
        assert_eq!(result["message"], json!("Discount applied: 15%"));
    }

    #[test]
    fn test_quantity_discount_tiers() {
        for (quantity, discount) in [(12, 0.10), (6, 0.05), (3, 0.0)] {
            let result = run(
                BusinessLogic::CalculateDiscount,
                json!({"price": 10, "quantity": quantity, "customerType": "regular"}),
            );
            assert_eq!(result["discount"].as_f64().unwrap(), discount, "quantity {quantity}");
        }
    }

    #[test]
    fn test_valid_user() {
        let result = run(
            BusinessLogic::ValidateUserData,
            json!({"email": "ann@example.com", "age": 30, "name": "Ann"}),
        );
        assert_eq!(result["isValid"], json!(true));
        assert_eq!(result["errors"], json!([]));
        assert_eq!(result["message"], json!("Validation passed"));
    }

    #[test]
    fn test_invalid_user() {
        let result = run(
            BusinessLogic::ValidateUserData,
            json!({"email": "not-an-email", "age": 16, "name": "A"}),
        );
        assert_eq!(result["isValid"], json!(false));
        assert_eq!(
            result["errors"],
            json!([
                "Invalid email address",
                "Must be 18 or older",
                "Name must be at least 2 characters"
            ])
        );
        assert_eq!(result["message"], json!("Validation failed"));
    }

    #[test]
    fn test_empty_input() {
        let result = run(BusinessLogic::ValidateUserData, json!({}));
        assert_eq!(result["errors"].as_array().unwrap().len(), 2);

        let result = run(BusinessLogic::CalculateDiscount, json!(null));
        assert_eq!(result["finalPrice"], json!(0));
    }

    #[test]
    fn test_environment_released() {
        let engine = Engine::default();
        run_business_logic(&engine, BusinessLogic::CalculateDiscount, Bindings::new()).unwrap();
        assert_eq!(engine.live_environments(), 0);
    }
}
