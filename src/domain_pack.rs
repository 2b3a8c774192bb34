//! Category taxonomy ("domain pack") consumed by the mapper.
//!
//! Packs are plain JSON resources loaded once at startup:
//!
//! ```json
//! {
//!   "id": "home_resale",
//!   "threshold": 0.28,
//!   "contextPenalty": 0.5,
//!   "contextStoplist": ["table", "room"],
//!   "categories": [
//!     { "id": "drinkware", "displayLabel": "Drinkware", "tokens": ["mug", "cup"], "priority": 10 }
//!   ]
//! }
//! ```
//!
//! A pack that fails to parse or validate is fatal for the caller: there is no
//! partially-loaded taxonomy.

use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use crate::error::Error;

pub const DEFAULT_THRESHOLD: f32 = 0.28;
pub const DEFAULT_CONTEXT_PENALTY: f32 = 0.5;
pub const MIN_CONTEXT_PENALTY: f32 = 0.1;

pub type Attributes = BTreeMap<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainCategory {
    pub id: String,
    #[serde(default)]
    pub display_label: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DomainCategory {
    pub fn new<S: Into<String>>(
        id: impl Into<String>,
        display_label: impl Into<String>,
        tokens: impl IntoIterator<Item = S>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            display_label: display_label.into(),
            tokens: tokens.into_iter().map(Into::into).collect(),
            priority,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Display label, falling back to the id when the pack leaves it empty.
    pub fn label(&self) -> &str {
        if self.display_label.is_empty() {
            &self.id
        } else {
            &self.display_label
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainPack {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_context_penalty")]
    pub context_penalty: f32,
    #[serde(default)]
    pub context_stoplist: Vec<String>,
    pub categories: Vec<DomainCategory>,
}

impl DomainPack {
    pub fn new(id: impl Into<String>, categories: Vec<DomainCategory>) -> Self {
        Self {
            id: id.into(),
            version: None,
            threshold: DEFAULT_THRESHOLD,
            context_penalty: DEFAULT_CONTEXT_PENALTY,
            context_stoplist: Vec::new(),
            categories,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_context_penalty(mut self, penalty: f32) -> Self {
        self.context_penalty = penalty;
        self
    }

    pub fn with_context_stoplist<S: Into<String>>(
        mut self,
        stoplist: impl IntoIterator<Item = S>,
    ) -> Self {
        self.context_stoplist = stoplist.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let pack: DomainPack = serde_json::from_str(json)?;
        pack.validated()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let pack: DomainPack = serde_json::from_reader(reader)?;
        pack.validated()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let pack = Self::from_reader(std::io::BufReader::new(file))?;

        tracing::info!(
            pack = %pack.id,
            categories = pack.categories.len(),
            path = %path.display(),
            "Loaded domain pack"
        );

        Ok(pack)
    }

    /// Checks the pack and normalizes its matchers to trimmed lowercase.
    pub fn validated(mut self) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(self.invalid(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }

        if self.categories.is_empty() {
            return Err(self.invalid("pack has no categories".into()));
        }

        let mut seen = HashSet::new();
        for category in &mut self.categories {
            category.id = category.id.trim().to_string();
            category.tokens = normalize_tokens(&category.tokens);
        }

        for category in &self.categories {
            if category.id.is_empty() {
                return Err(self.invalid("category with an empty id".into()));
            }

            if !seen.insert(category.id.as_str()) {
                return Err(self.invalid(format!("duplicate category id '{}'", category.id)));
            }

            if category.tokens.is_empty() {
                return Err(self.invalid(format!("category '{}' has no tokens", category.id)));
            }
        }

        self.context_stoplist = normalize_tokens(&self.context_stoplist);

        Ok(self)
    }

    /// Context penalty actually applied: non-positive or non-finite values fall
    /// back to the default, everything else is clamped into `[0.1, 1.0]`.
    pub fn effective_context_penalty(&self) -> f32 {
        if self.context_penalty.is_finite() && self.context_penalty > 0.0 {
            self.context_penalty.clamp(MIN_CONTEXT_PENALTY, 1.0)
        } else {
            DEFAULT_CONTEXT_PENALTY
        }
    }

    pub fn category(&self, id: &str) -> Option<&DomainCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidPack {
            pack: self.id.clone(),
            reason,
        }
    }
}

fn normalize_tokens(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_context_penalty() -> f32 {
    DEFAULT_CONTEXT_PENALTY
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACK: &str = r#"{
        "id": "home_resale",
        "version": "1.0.0",
        "contextStoplist": [" Table ", "ROOM"],
        "categories": [
            { "id": "drinkware", "displayLabel": "Drinkware", "tokens": ["Mug", "cup"], "priority": 10,
              "attributes": { "segment": "kitchen" } },
            { "id": "furniture", "tokens": ["table", "chair"], "priority": 2 }
        ]
    }"#;

    #[test]
    fn loads_with_defaults_and_normalizes() {
        let pack = DomainPack::from_json_str(PACK).unwrap();

        assert_eq!(pack.threshold, DEFAULT_THRESHOLD);
        assert_eq!(pack.context_penalty, DEFAULT_CONTEXT_PENALTY);
        assert_eq!(pack.context_stoplist, vec!["table", "room"]);
        assert_eq!(pack.categories[0].tokens, vec!["mug", "cup"]);
        assert_eq!(pack.categories[0].attributes["segment"], "kitchen");
        assert_eq!(pack.category("furniture").map(|c| c.label()), Some("furniture"));
        assert_eq!(pack.category("drinkware").map(|c| c.label()), Some("Drinkware"));
    }

    #[test]
    fn threshold_out_of_range_is_fatal() {
        for threshold in [-0.1, 1.01] {
            let pack = DomainPack::new("p", vec![DomainCategory::new("a", "A", ["a"], 1)])
                .with_threshold(threshold);
            assert!(matches!(pack.validated(), Err(Error::InvalidPack { .. })));
        }
    }

    #[test]
    fn duplicate_ids_and_empty_tokens_are_fatal() {
        let dup = DomainPack::new(
            "p",
            vec![
                DomainCategory::new("a", "A", ["x"], 1),
                DomainCategory::new("a", "A2", ["y"], 2),
            ],
        );
        assert!(matches!(dup.validated(), Err(Error::InvalidPack { .. })));

        let blank = DomainPack::new("p", vec![DomainCategory::new("a", "A", ["  "], 1)]);
        assert!(matches!(blank.validated(), Err(Error::InvalidPack { .. })));

        let empty = DomainPack::new("p", vec![]);
        assert!(matches!(empty.validated(), Err(Error::InvalidPack { .. })));
    }

    #[test]
    fn unparseable_pack_is_fatal() {
        assert!(matches!(
            DomainPack::from_json_str(r#"{ "id": "p" }"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn context_penalty_clamping() {
        let pack = DomainPack::new("p", vec![]);

        assert_eq!(pack.clone().with_context_penalty(0.0).effective_context_penalty(), 0.5);
        assert_eq!(pack.clone().with_context_penalty(-3.0).effective_context_penalty(), 0.5);
        assert_eq!(pack.clone().with_context_penalty(f32::NAN).effective_context_penalty(), 0.5);
        assert_eq!(pack.clone().with_context_penalty(0.01).effective_context_penalty(), 0.1);
        assert_eq!(pack.clone().with_context_penalty(4.0).effective_context_penalty(), 1.0);
        assert_eq!(pack.with_context_penalty(0.7).effective_context_penalty(), 0.7);
    }
}
