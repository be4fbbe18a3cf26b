use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::descriptor::FieldType;

/// A compiled pattern that still remembers its source text.
#[derive(Clone, Serialize)]
#[serde(transparent)]
pub struct Pattern {
    source: String,
    #[serde(skip)]
    regex: Regex,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Everything a payload value must satisfy for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraint {
    pub kind: FieldType,
    /// Required on create; a required field may never be set to null.
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Human-readable message used instead of the generic one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldConstraint {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            pattern: None,
            values: None,
            default: None,
            message: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check a non-null value. Returns every problem found.
    pub fn check(&self, value: &JsonValue) -> Vec<String> {
        let mut problems = Vec::new();

        match self.kind {
            FieldType::String | FieldType::Text | FieldType::Email | FieldType::Phone => {
                let Some(s) = value.as_str() else {
                    return vec![self.or_message("must be a string")];
                };
                self.check_text(s, &mut problems);
                if self.kind == FieldType::Email && !is_email(s) {
                    problems.push(self.or_message("must be a valid email address"));
                }
            }
            FieldType::Integer => match value.as_i64() {
                Some(n) => self.check_range(n as f64, &mut problems),
                None => return vec![self.or_message("must be an integer")],
            },
            FieldType::Number | FieldType::Decimal | FieldType::Currency => {
                let n = match value {
                    JsonValue::Number(n) => n.as_f64(),
                    JsonValue::String(s) if self.kind != FieldType::Number => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match n.filter(|n| n.is_finite()) {
                    Some(n) => self.check_range(n, &mut problems),
                    None => return vec![self.or_message("must be a number")],
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    problems.push(self.or_message("must be true or false"));
                }
            }
            FieldType::Date => {
                if !value.as_str().is_some_and(is_date) {
                    problems.push(self.or_message("must be a date (YYYY-MM-DD)"));
                }
            }
            FieldType::Timestamp => {
                if !value.as_str().is_some_and(is_timestamp) {
                    problems.push(self.or_message("must be an RFC 3339 timestamp"));
                }
            }
            FieldType::Uuid => {
                if !value.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()) {
                    problems.push(self.or_message("must be a UUID"));
                }
            }
            FieldType::Enum => {
                let ok = value
                    .as_str()
                    .zip(self.values.as_ref())
                    .is_some_and(|(s, values)| values.iter().any(|v| v == s));
                if !ok {
                    problems.push(self.or_message("has an unsupported value"));
                }
            }
            FieldType::ForeignKey => {
                if !value.as_i64().is_some_and(|id| id > 0) {
                    problems.push(self.or_message("must be a positive record id"));
                }
            }
            FieldType::Json => {
                if !(value.is_object() || value.is_array()) {
                    problems.push(self.or_message("must be a JSON object or array"));
                }
            }
            FieldType::Array => match value.as_array() {
                Some(items) => {
                    if let Some(min) = self.min_length.filter(|min| items.len() < *min) {
                        problems.push(format!("must contain at least {min} items"));
                    }
                    if let Some(max) = self.max_length.filter(|max| items.len() > *max) {
                        problems.push(format!("must contain at most {max} items"));
                    }
                }
                None => problems.push(self.or_message("must be an array")),
            },
        }

        problems
    }

    fn check_text(&self, s: &str, problems: &mut Vec<String>) {
        let len = s.chars().count();
        if let Some(min) = self.min_length.filter(|min| len < *min) {
            problems.push(if min == 1 {
                "must not be empty".to_string()
            } else {
                format!("must be at least {min} characters")
            });
        }
        if let Some(max) = self.max_length.filter(|max| len > *max) {
            problems.push(format!("must be at most {max} characters"));
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                problems.push(self.or_message(&format!("must match pattern {}", pattern.as_str())));
            }
        }
    }

    fn check_range(&self, n: f64, problems: &mut Vec<String>) {
        if let Some(min) = self.min.filter(|min| n < *min) {
            problems.push(format!("must be at least {min}"));
        }
        if let Some(max) = self.max.filter(|max| n > *max) {
            problems.push(format!("must be at most {max}"));
        }
    }

    fn or_message(&self, generic: &str) -> String {
        self.message.clone().unwrap_or_else(|| generic.to_string())
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_bounds_and_pattern() {
        let c = FieldConstraint::new(FieldType::String)
            .length(Some(2), Some(5))
            .pattern(Pattern::new("^[A-Z]+$").unwrap());
        assert!(c.check(&json!("ABC")).is_empty());
        assert_eq!(c.check(&json!("a")).len(), 2);
        assert_eq!(c.check(&json!(12)), vec!["must be a string".to_string()]);
    }

    #[test]
    fn currency_accepts_numeric_strings() {
        let c = FieldConstraint::new(FieldType::Currency).range(Some(0.0), None);
        assert!(c.check(&json!("19.99")).is_empty());
        assert!(c.check(&json!(5)).is_empty());
        assert_eq!(c.check(&json!(-1)), vec!["must be at least 0".to_string()]);
        assert_eq!(c.check(&json!("abc")), vec!["must be a number".to_string()]);
    }

    #[test]
    fn enum_uses_synthesized_message() {
        let c = FieldConstraint::new(FieldType::Enum)
            .one_of(["low", "high"])
            .message("must be one of: low, high");
        assert!(c.check(&json!("low")).is_empty());
        assert_eq!(c.check(&json!("mid")), vec!["must be one of: low, high".to_string()]);
    }

    #[test]
    fn temporal_and_identifier_types() {
        assert!(FieldConstraint::new(FieldType::Date).check(&json!("2024-02-29")).is_empty());
        assert!(!FieldConstraint::new(FieldType::Date).check(&json!("2023-02-29")).is_empty());
        assert!(FieldConstraint::new(FieldType::Timestamp)
            .check(&json!("2024-05-01T08:30:00Z"))
            .is_empty());
        assert!(FieldConstraint::new(FieldType::Uuid)
            .check(&json!("0190b1f4-7f3a-7c2e-9a51-2b7f1d0e3c44"))
            .is_empty());
        assert!(!FieldConstraint::new(FieldType::ForeignKey).check(&json!(0)).is_empty());
        assert!(!FieldConstraint::new(FieldType::Email).check(&json!("a@b")).is_empty());
        assert!(FieldConstraint::new(FieldType::Email).check(&json!("a@b.co")).is_empty());
    }

    #[test]
    fn patterns_compare_by_source() {
        assert_eq!(Pattern::new("^a$").unwrap(), Pattern::new("^a$").unwrap());
        assert!(Pattern::new("(").is_err());
    }
}
