//! Label selectors
//!
//! Compiles group selectors (structured `LabelSelector`s or the textual
//! `key in (a,b),!other` grammar) into a conjunction of requirements and
//! tests them against claim labels.

mod parser;
mod validation;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use validation::{validate_label_key, validate_label_value};

// =============================================================================
// Errors
// =============================================================================

/// Why a selector failed to compile
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("unexpected {found} at position {position}, expected {expected}")]
    Syntax {
        position: usize,
        found: String,
        expected: String,
    },

    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid label value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },

    #[error("operator {operator} on key {key:?}: {reason}")]
    InvalidValueCount {
        key: String,
        operator: Operator,
        reason: String,
    },

    #[error("unsupported match expression operator {0:?}")]
    UnsupportedOperator(String),
}

// =============================================================================
// Requirement
// =============================================================================

/// Selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    LessThan,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Equals => write!(f, "="),
            Operator::NotEquals => write!(f, "!="),
            Operator::In => write!(f, "in"),
            Operator::NotIn => write!(f, "notin"),
            Operator::Exists => write!(f, "exists"),
            Operator::DoesNotExist => write!(f, "!"),
            Operator::GreaterThan => write!(f, "gt"),
            Operator::LessThan => write!(f, "lt"),
        }
    }
}

/// A single `key <op> values` constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    /// Build a validated requirement
    pub fn new<I, S>(key: &str, operator: Operator, values: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_label_key(key)?;
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();

        let count_error = |reason: &str| SelectorError::InvalidValueCount {
            key: key.to_string(),
            operator,
            reason: reason.to_string(),
        };

        match operator {
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(count_error("at least one value is required"));
                }
            }
            Operator::Equals | Operator::NotEquals => {
                if values.len() != 1 {
                    return Err(count_error("exactly one value is required"));
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(count_error("values are not allowed"));
                }
            }
            Operator::GreaterThan | Operator::LessThan => {
                if values.len() != 1 {
                    return Err(count_error("exactly one value is required"));
                }
                if let Some(v) = values.iter().next() {
                    if v.parse::<i64>().is_err() {
                        return Err(SelectorError::InvalidValue {
                            value: v.clone(),
                            reason: "must be an integer".into(),
                        });
                    }
                }
            }
        }

        for value in &values {
            validate_label_value(value)?;
        }

        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// Test this requirement against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => {
                actual.map(|v| self.values.contains(v)).unwrap_or(false)
            }
            Operator::NotEquals | Operator::NotIn => {
                actual.map(|v| !self.values.contains(v)).unwrap_or(true)
            }
            Operator::Exists => actual.is_some(),
            Operator::DoesNotExist => actual.is_none(),
            Operator::GreaterThan | Operator::LessThan => {
                let (Some(actual), Some(bound)) = (
                    actual.and_then(|v| v.parse::<i64>().ok()),
                    self.values.iter().next().and_then(|v| v.parse::<i64>().ok()),
                ) else {
                    return false;
                };
                if self.operator == Operator::GreaterThan {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals => write!(f, "{}={}", self.key, joined()),
            Operator::NotEquals => write!(f, "{}!={}", self.key, joined()),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, joined()),
            Operator::LessThan => write!(f, "{}<{}", self.key, joined()),
            Operator::In => write!(f, "{} in ({})", self.key, joined()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, joined()),
        }
    }
}

// =============================================================================
// Selector
// =============================================================================

/// Conjunction of requirements; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector that matches every label set
    pub fn everything() -> Self {
        Self::default()
    }

    /// Build from requirements, ordered by key for a canonical form
    pub fn from_requirements(mut requirements: Vec<Requirement>) -> Self {
        requirements.sort_by(|a, b| a.key.cmp(&b.key));
        Self { requirements }
    }

    /// Parse the textual selector grammar
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        parser::parse(input).map(Self::from_requirements)
    }

    /// Compile a structured `LabelSelector`
    pub fn from_label_selector(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements = Vec::new();

        if let Some(match_labels) = &selector.match_labels {
            for (key, value) in match_labels {
                requirements.push(Requirement::new(key, Operator::Equals, [value.as_str()])?);
            }
        }

        if let Some(expressions) = &selector.match_expressions {
            for expr in expressions {
                let operator = match expr.operator.as_str() {
                    "In" => Operator::In,
                    "NotIn" => Operator::NotIn,
                    "Exists" => Operator::Exists,
                    "DoesNotExist" => Operator::DoesNotExist,
                    other => return Err(SelectorError::UnsupportedOperator(other.to_string())),
                };
                let values = expr.values.clone().unwrap_or_default();
                requirements.push(Requirement::new(&expr.key, operator, values)?);
            }
        }

        Ok(Self::from_requirements(requirements))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Test every requirement against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality_and_inequality() {
        let sel = Selector::parse("app=db,tier!=cache").unwrap();
        assert!(sel.matches(&labels(&[("app", "db")])));
        assert!(sel.matches(&labels(&[("app", "db"), ("tier", "data")])));
        assert!(!sel.matches(&labels(&[("app", "db"), ("tier", "cache")])));
        assert!(!sel.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_set_operators() {
        let sel = Selector::parse("env in (prod, staging), zone notin (us-east-1a)").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));
        assert!(sel.matches(&labels(&[("env", "staging"), ("zone", "us-west-2b")])));
        assert!(!sel.matches(&labels(&[("env", "prod"), ("zone", "us-east-1a")])));
        assert!(!sel.matches(&labels(&[("env", "dev")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn test_existence() {
        let sel = Selector::parse("backup,!ephemeral").unwrap();
        assert!(sel.matches(&labels(&[("backup", "")])));
        assert!(!sel.matches(&labels(&[("backup", "yes"), ("ephemeral", "true")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn test_numeric_comparison() {
        let sel = Selector::parse("replicas>2,priority<10").unwrap();
        assert!(sel.matches(&labels(&[("replicas", "3"), ("priority", "1")])));
        assert!(!sel.matches(&labels(&[("replicas", "2"), ("priority", "1")])));
        assert!(!sel.matches(&labels(&[("replicas", "three"), ("priority", "1")])));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let sel = Selector::parse("").unwrap();
        assert!(sel.is_empty());
        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("any", "thing")])));

        let sel = Selector::from_label_selector(&LabelSelector::default()).unwrap();
        assert_eq!(sel, Selector::everything());
    }

    #[test]
    fn test_canonical_display() {
        let sel = Selector::parse("zone notin (b,a), app == db, !legacy, backup").unwrap();
        assert_eq!(sel.to_string(), "app=db,backup,!legacy,zone notin (a,b)");
        assert_eq!(Selector::parse(&sel.to_string()).unwrap(), sel);
    }

    #[test]
    fn test_from_label_selector() {
        let ls = LabelSelector {
            match_labels: Some([("app".to_string(), "db".to_string())].into()),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "In".into(),
                    values: Some(vec!["data".into(), "storage".into()]),
                },
                LabelSelectorRequirement {
                    key: "scratch".into(),
                    operator: "DoesNotExist".into(),
                    values: None,
                },
            ]),
        };
        let sel = Selector::from_label_selector(&ls).unwrap();
        assert_eq!(sel.to_string(), "app=db,!scratch,tier in (data,storage)");
        assert!(sel.matches(&labels(&[("app", "db"), ("tier", "data")])));
        assert!(!sel.matches(&labels(&[("app", "db"), ("tier", "data"), ("scratch", "y")])));
    }

    #[test]
    fn test_from_label_selector_rejects_bad_expressions() {
        let bad_operator = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".into(),
                operator: "Like".into(),
                values: Some(vec!["data".into()]),
            }]),
        };
        assert_eq!(
            Selector::from_label_selector(&bad_operator),
            Err(SelectorError::UnsupportedOperator("Like".into()))
        );

        let empty_in = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".into(),
                operator: "In".into(),
                values: Some(vec![]),
            }]),
        };
        assert!(matches!(
            Selector::from_label_selector(&empty_in),
            Err(SelectorError::InvalidValueCount { .. })
        ));

        let exists_with_values = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".into(),
                operator: "Exists".into(),
                values: Some(vec!["x".into()]),
            }]),
        };
        assert!(Selector::from_label_selector(&exists_with_values).is_err());

        let bad_value = LabelSelector {
            match_labels: Some([("app".to_string(), "not valid!".to_string())].into()),
            match_expressions: None,
        };
        assert!(matches!(
            Selector::from_label_selector(&bad_value),
            Err(SelectorError::InvalidValue { .. })
        ));
    }
}
