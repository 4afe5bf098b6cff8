//! Regular-expression validation. The pattern compiles once during the
//! per-term compile pass into the node's compiled bag; validation falls
//! back to compiling on the fly when the pass has not run.

use regex::Regex;

use crate::error::{Error, Result};
use crate::graph::{CompiledValue, Node};
use crate::property::PropertyValue;
use crate::term::{vocab, TermCompiler, Validator};

#[derive(Debug, Clone, Copy)]
pub struct PatternValidator;

impl PatternValidator {
    fn pattern_of(&self, schema_node: &Node) -> Result<Regex> {
        if let Some(CompiledValue::Regex(r)) = schema_node.compiled(vocab::PATTERN) {
            return Ok(r.clone());
        }
        let raw = schema_node
            .property(vocab::PATTERN)
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| Error::validation("pattern", "pattern is not a string value"))?;
        Regex::new(raw).map_err(|e| Error::validation("pattern", format!("invalid pattern: {e}")))
    }
}

impl Validator for PatternValidator {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn validate_value(&self, value: Option<&str>, schema_node: &Node) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let pattern = self.pattern_of(schema_node)?;
        if pattern.is_match(value) {
            return Ok(());
        }
        Err(Error::Validation {
            validator: "pattern",
            msg: format!("value does not match pattern {}", pattern.as_str()),
            value: Some(value.to_string()),
        })
    }
}

impl TermCompiler for PatternValidator {
    fn compile_term(&self, _term: &str, value: &PropertyValue) -> Result<Option<CompiledValue>> {
        let raw = value
            .as_str()
            .ok_or_else(|| Error::validation("pattern", "pattern is not a string value"))?;
        let regex = Regex::new(raw)
            .map_err(|e| Error::validation("pattern", format!("invalid pattern: {e}")))?;
        Ok(Some(CompiledValue::Regex(regex)))
    }
}
