use std::{fmt, str::FromStr};

use common::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four retrieval strategies, selected directly from the endpoint name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Local,
    Global,
    Drift,
    Basic,
}

impl SearchKind {
    pub const ALL: [Self; 4] = [Self::Local, Self::Global, Self::Drift, Self::Basic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Drift => "drift",
            Self::Basic => "basic",
        }
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            "drift" => Ok(Self::Drift),
            "basic" => Ok(Self::Basic),
            other => Err(format!("unknown search kind '{other}'")),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_N_RESULTS: i64 = 10;
pub const DEFAULT_COMMUNITY_LEVEL: i64 = 1;
pub const DEFAULT_RESPONSE_TYPE: &str = "json";

/// A search as it arrives on the wire. Absent and `null` options both take
/// their defaults in [`SearchRequest::validate`]. Numeric fields are signed so
/// that negative values reach validation instead of failing deserialization
/// with an opaque message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub n_results: Option<i64>,
    #[serde(default)]
    pub community_level: Option<i64>,
    #[serde(default)]
    pub response_type: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            n_results: None,
            community_level: None,
            response_type: None,
        }
    }

    #[must_use]
    pub const fn with_community_level(mut self, level: i64) -> Self {
        self.community_level = Some(level);
        self
    }

    #[must_use]
    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = Some(response_type.into());
        self
    }

    #[must_use]
    pub const fn with_n_results(mut self, n_results: i64) -> Self {
        self.n_results = Some(n_results);
        self
    }

    pub fn validate(&self) -> Result<ValidSearch, AppError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }
        let level = self.community_level.unwrap_or(DEFAULT_COMMUNITY_LEVEL);
        let community_level = u32::try_from(level).map_err(|_| {
            AppError::Validation(format!(
                "community_level must be a non-negative integer, got {level}"
            ))
        })?;
        let n_results = self.n_results.unwrap_or(DEFAULT_N_RESULTS);
        let result_limit = usize::try_from(n_results)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                AppError::Validation(format!("n_results must be at least 1, got {n_results}"))
            })?;

        Ok(ValidSearch {
            query: query.to_string(),
            result_limit,
            community_level,
            response_type: self
                .response_type
                .clone()
                .unwrap_or_else(|| DEFAULT_RESPONSE_TYPE.to_string()),
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSearch {
    pub query: String,
    pub result_limit: usize,
    pub community_level: u32,
    pub response_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub response: Value,
    pub context: Value,
}

/// One incrementally produced piece of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub content: String,
}

impl Fragment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

pub fn wants_json(response_type: &str) -> bool {
    response_type.trim().eq_ignore_ascii_case("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_kind_parsing_is_strict() {
        for kind in SearchKind::ALL {
            assert_eq!(kind.as_str().parse::<SearchKind>(), Ok(kind));
        }
        assert!("Local".parse::<SearchKind>().is_err());
        assert!("hybrid".parse::<SearchKind>().is_err());
        assert!("".parse::<SearchKind>().is_err());
    }

    #[test]
    fn request_defaults_apply() {
        let request: SearchRequest = serde_json::from_value(json!({"query": "hi"})).unwrap();
        assert_eq!(request, SearchRequest::new("hi"));

        let valid = request.validate().unwrap();
        assert_eq!(valid.result_limit, 10);
        assert_eq!(valid.community_level, 1);
        assert_eq!(valid.response_type, "json");
    }

    #[test]
    fn null_options_take_their_defaults() {
        let request: SearchRequest = serde_json::from_value(json!({
            "query": "hi",
            "n_results": null,
            "community_level": null,
            "response_type": null
        }))
        .unwrap();

        assert_eq!(request, SearchRequest::new("hi"));
        assert_eq!(
            request.validate().unwrap(),
            SearchRequest::new("hi").validate().unwrap()
        );
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(matches!(
            SearchRequest::new("   ").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            SearchRequest::new("q").with_community_level(-1).validate(),
            Err(AppError::Validation(msg)) if msg.contains("community_level")
        ));
        assert!(matches!(
            SearchRequest::new("q").with_n_results(0).validate(),
            Err(AppError::Validation(msg)) if msg.contains("n_results")
        ));
    }

    #[test]
    fn validation_trims_query_and_keeps_response_type() {
        let valid = SearchRequest::new("  what is this?  ")
            .with_response_type("Multiple Paragraphs")
            .with_community_level(2)
            .validate()
            .unwrap();
        assert_eq!(valid.query, "what is this?");
        assert_eq!(valid.community_level, 2);
        assert_eq!(valid.result_limit, 10);
        assert_eq!(valid.response_type, "Multiple Paragraphs");
    }

    #[test]
    fn json_response_type_is_case_insensitive() {
        assert!(wants_json("json"));
        assert!(wants_json(" JSON "));
        assert!(!wants_json("multiple paragraphs"));
    }
}
