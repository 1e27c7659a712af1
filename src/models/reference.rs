use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

use super::{non_empty, require_text, Labelled, Resource, SortField, SortKey, SortSpec, Table};
use crate::error::ValidationError;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid url pattern"));

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceDraft {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

pub fn is_valid_url(url: &str) -> bool {
    URL_PATTERN.is_match(url.trim())
}

/// Splits a comma separated tag list, trimming and dropping blanks and repeats.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

impl Resource for Reference {
    type Draft = ReferenceDraft;

    const TABLE: Table = Table::References;
    const DEFAULT_ORDER: SortSpec = SortSpec::newest_first();

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> ReferenceDraft {
        ReferenceDraft {
            title: self.title.clone(),
            url: self.url.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
        }
    }

    fn validate(draft: &ReferenceDraft) -> Result<(), ValidationError> {
        require_text("title", &draft.title)?;
        require_text("url", &draft.url)?;
        if !is_valid_url(&draft.url) {
            return Err(ValidationError::new(
                "url",
                format!("'{}' is not a valid http(s) URL", draft.url.trim()),
            ));
        }
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.url.as_str()];
        if let Some(description) = non_empty(&self.description) {
            fields.push(description);
        }
        fields
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Title => "title",
            _ => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::text(&self.title),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for Reference {
    fn label(&self) -> String {
        self.title.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(is_valid_url("https://example.com/paper.pdf"));
        assert!(is_valid_url("http://localhost:8080"));
        assert!(!is_valid_url("example.com"));
        assert!(!is_valid_url("https://"));
        assert!(!is_valid_url("ftp://example.com"));
    }

    #[test]
    fn tag_list_is_trimmed_and_deduplicated() {
        assert_eq!(parse_tags(" rust, Papers ,rust,, papers"), vec!["rust", "Papers"]);
    }

    #[test]
    fn null_tags_deserialize_as_empty() -> anyhow::Result<()> {
        let raw = r#"{
            "id": "r1",
            "user_id": "u1",
            "title": "Spec",
            "url": "https://example.com",
            "description": null,
            "tags": null,
            "created_at": "2024-03-01T10:00:00Z"
        }"#;
        let reference: Reference = serde_json::from_str(raw)?;
        assert!(reference.tags.is_empty());
        Ok(())
    }
}
