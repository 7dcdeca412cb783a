//! Schema-checked parsing of proposed updates.
//!
//! Raw JSON from the oracle is validated against the embedded JSON Schema
//! (Draft 2020-12) and only then deserialized into typed enums.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;

use crate::core::error::EngineError;
use crate::core::update::ProposedUpdate;

pub const UPDATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/proposed_update.schema.json"
));

static UPDATE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(UPDATE_SCHEMA).unwrap();
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .unwrap()
});

/// Parse and validate a proposed update.
///
/// Every failure is an [`EngineError::Validation`], so a malformed update is
/// rejected the same way as an out-of-range one.
pub fn parse_update(raw: &str) -> Result<ProposedUpdate, EngineError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| {
        EngineError::validation(
            format!("line {} column {}", err.line(), err.column()),
            err.to_string(),
        )
    })?;

    let messages: Vec<String> = UPDATE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(EngineError::validation(
            "update",
            format!("schema validation failed: {}", messages.join("; ")),
        ));
    }

    serde_json::from_value(value).map_err(|err| EngineError::validation("update", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Stance, TurnOutcome};

    #[test]
    fn embedded_schema_compiles() {
        assert!(UPDATE_VALIDATOR.is_valid(&serde_json::json!({})));
    }

    #[test]
    fn parses_a_full_update() {
        let raw = r#"{
            "outcome": "data_provided",
            "milestones": { "symptom_verified": true },
            "evidence": [{
                "id": "ev-a",
                "summary": "pool exhausted",
                "tests_hypothesis_id": "h1",
                "stance": "strongly_supports",
                "completeness": 0.8
            }],
            "hypotheses": [{ "id": "h1", "statement": "pool too small", "category": "config" }],
            "status_request": "investigating"
        }"#;
        let update = parse_update(raw).expect("parse");
        assert_eq!(update.outcome, TurnOutcome::DataProvided);
        assert_eq!(update.evidence[0].stance, Some(Stance::StronglySupports));
        assert_eq!(update.milestones.symptom_verified, Some(true));
    }

    #[test]
    fn unknown_stance_fails_schema() {
        let raw = r#"{"evidence":[{"summary":"s","tests_hypothesis_id":"h1","stance":"loves"}]}"#;
        let err = parse_update(raw).expect_err("reject");
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn out_of_range_completeness_fails_schema() {
        let raw = r#"{"evidence_links":[{"hypothesis_id":"h","evidence_id":"e","stance":"supports","completeness":1.5}]}"#;
        assert!(parse_update(raw).is_err());
    }

    #[test]
    fn extra_field_fails_schema() {
        let err = parse_update(r#"{"mood":"calm"}"#).expect_err("reject");
        assert!(err.to_string().contains("mood"));
    }

    #[test]
    fn malformed_json_names_the_position() {
        let err = parse_update("{\n  \"outcome\": ").expect_err("reject");
        assert!(err.to_string().contains("line 2"));
    }
}
