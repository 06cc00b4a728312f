use std::fmt;

use regex::Regex;

use crate::error::{NamingError, QtlError};

pub const DEFAULT_STUDY_PATTERN: &str = r"^QTS\d+$";
pub const DEFAULT_DATASET_PATTERN: &str = r"^QTD\d+$";

/// A name pattern that only accepts full matches.
///
/// The raw source is wrapped as `^(?:raw)$` before compiling, so callers may pass
/// anchored or unanchored expressions and still get whole-string semantics.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self, QtlError> {
        let regex =
            Regex::new(&format!("^(?:{raw})$")).map_err(|err| QtlError::InvalidPattern {
                pattern: raw.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_full_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

pub fn validate<'a>(name: &'a str, pattern: &Pattern) -> Result<&'a str, NamingError> {
    if name.is_empty() {
        return Err(NamingError::Empty);
    }
    if !pattern.is_full_match(name) {
        return Err(NamingError::Mismatch {
            name: name.to_string(),
            pattern: pattern.as_str().to_string(),
        });
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct NamingRules {
    pub study: Pattern,
    pub dataset: Pattern,
}

impl NamingRules {
    pub fn new(study: &str, dataset: &str) -> Result<Self, QtlError> {
        Ok(Self {
            study: Pattern::new(study)?,
            dataset: Pattern::new(dataset)?,
        })
    }

    pub fn validate_study<'a>(&self, name: &'a str) -> Result<&'a str, NamingError> {
        validate(name, &self.study)
    }

    pub fn validate_dataset<'a>(&self, name: &'a str) -> Result<&'a str, NamingError> {
        validate(name, &self.dataset)
    }
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            study: Pattern::new(DEFAULT_STUDY_PATTERN).expect("default study pattern compiles"),
            dataset: Pattern::new(DEFAULT_DATASET_PATTERN)
                .expect("default dataset pattern compiles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accepts_full_match() {
        let rules = NamingRules::default();
        assert_eq!(rules.validate_dataset("QTD7").unwrap(), "QTD7");
        assert_eq!(rules.validate_study("QTS000123").unwrap(), "QTS000123");
    }

    #[test]
    fn rejects_empty_name() {
        let rules = NamingRules::default();
        assert_matches!(rules.validate_study(""), Err(NamingError::Empty));
    }

    #[test]
    fn rejects_partial_match() {
        let rules = NamingRules::default();
        for name in ["QTD", "QTD7x", "xQTD7", "QTD7/", "QTS7", " QTD7", "QTD7\n"] {
            assert_matches!(
                rules.validate_dataset(name),
                Err(NamingError::Mismatch { .. }),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn matching_is_case_sensitive() {
        let rules = NamingRules::default();
        assert!(rules.validate_dataset("qtd7").is_err());
        assert!(rules.validate_study("qts1").is_err());
    }

    #[test]
    fn unanchored_pattern_is_anchored() {
        let pattern = Pattern::new(r"GTEx\d+").unwrap();
        assert!(validate("GTEx12", &pattern).is_ok());
        assert!(validate("xGTEx12", &pattern).is_err());
        assert!(validate("GTEx12_v2", &pattern).is_err());
    }

    #[test]
    fn alternation_needs_whole_string() {
        let pattern = Pattern::new("a|ab").unwrap();
        assert!(validate("ab", &pattern).is_ok());
        assert!(validate("abc", &pattern).is_err());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = Pattern::new("QTD(").unwrap_err();
        assert_matches!(err, QtlError::InvalidPattern { .. });
    }

    #[test]
    fn mismatch_reports_pattern_source() {
        let rules = NamingRules::default();
        let err = rules.validate_study("bad-name").unwrap_err();
        assert_eq!(
            err.to_string(),
            r"name 'bad-name' does not match pattern '^QTS\d+$'"
        );
    }
}
