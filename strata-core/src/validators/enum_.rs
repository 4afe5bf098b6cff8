//! One-of-a-set validation. `const` is the single-value form of the
//! same validator, registered under its own term.

use crate::error::{Error, Result};
use crate::graph::Node;
use crate::property::PropertyValue;
use crate::term::Validator;

/// Checks that a value equals one of the declared options.
#[derive(Debug, Clone)]
pub struct EnumValidator {
    name: &'static str,
    term: &'static str,
}

impl EnumValidator {
    pub fn new(name: &'static str, term: &'static str) -> Self {
        EnumValidator { name, term }
    }

    fn options(&self, schema_node: &Node) -> Result<Vec<String>> {
        match schema_node.property(self.term) {
            Some(PropertyValue::Str(s)) => Ok(vec![s.to_string()]),
            Some(PropertyValue::List(items)) => {
                Ok(items.iter().map(|s| s.to_string()).collect())
            }
            _ => Err(Error::validation(self.name, "invalid enumeration options")),
        }
    }
}

impl Validator for EnumValidator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn validate_value(&self, value: Option<&str>, schema_node: &Node) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let options = self.options(schema_node)?;
        if options.iter().any(|o| o == value) {
            return Ok(());
        }
        Err(Error::Validation {
            validator: self.name,
            msg: "none of the options match".into(),
            value: Some(value.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::term::vocab;

    #[test]
    fn matches_options() {
        let mut g = Graph::new();
        let n = g.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        g.node_mut(n)
            .set_property(vocab::ENUM, PropertyValue::list(["a", "b"]));
        let v = EnumValidator::new("enum", vocab::ENUM);
        assert!(v.validate_value(Some("a"), g.node(n)).is_ok());
        assert!(v.validate_value(Some("c"), g.node(n)).is_err());
        assert!(v.validate_value(None, g.node(n)).is_ok());
    }

    #[test]
    fn const_is_single_option() {
        let mut g = Graph::new();
        let n = g.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        g.node_mut(n)
            .set_property(vocab::CONST, PropertyValue::string("only"));
        let v = EnumValidator::new("const", vocab::CONST);
        assert!(v.validate_value(Some("only"), g.node(n)).is_ok());
        assert!(v.validate_value(Some("other"), g.node(n)).is_err());
    }
}
