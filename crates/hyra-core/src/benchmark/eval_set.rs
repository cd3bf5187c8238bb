//! Evaluation set loading

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One labelled question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalItem {
    /// Domain name, matched exactly against the seeded domains
    pub domain: String,
    #[serde(rename = "q")]
    pub question: String,
    #[serde(rename = "a")]
    pub expected_answer: String,
}

/// A non-empty list of [`EvalItem`]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalSet {
    items: Vec<EvalItem>,
}

impl EvalSet {
    /// Parse a JSON array of `{"domain", "q", "a"}` objects
    pub fn from_json(contents: &str) -> Result<Self> {
        let items: Vec<EvalItem> =
            serde_json::from_str(contents).map_err(|e| Error::EvalSetError(e.to_string()))?;

        if items.is_empty() {
            return Err(Error::EvalSetError("the set has no items".to_string()));
        }
        for (index, item) in items.iter().enumerate() {
            if item.domain.trim().is_empty() || item.question.trim().is_empty() {
                return Err(Error::EvalSetError(format!(
                    "item {} needs a domain and a question",
                    index
                )));
            }
        }

        Ok(Self { items })
    }

    /// Read and parse an evaluation set file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::EvalSetError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn items(&self) -> &[EvalItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_short_field_names() {
        let set = EvalSet::from_json(
            r#"[
                {"domain": "Math Reasoning", "q": "What is 17 * 23?", "a": "391"},
                {"domain": "Factual Q&A", "q": "Capital of France?", "a": "Paris"}
            ]"#,
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.items()[0].question, "What is 17 * 23?");
        assert_eq!(set.items()[0].expected_answer, "391");
    }

    #[test]
    fn test_rejects_empty_and_malformed_sets() {
        let err = EvalSet::from_json("[]").unwrap_err();
        assert_eq!(err.code(), "E700");

        assert!(EvalSet::from_json(r#"{"domain": "Factual Q&A"}"#).is_err());
        assert!(EvalSet::from_json(r#"[{"domain": "", "q": "x", "a": "y"}]"#).is_err());
    }

    #[test]
    fn test_missing_file_is_an_eval_set_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = EvalSet::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::EvalSetError(ref msg) if msg.contains("missing.json")));
    }
}
