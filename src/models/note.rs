use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{
    non_empty, require_text, InsertPosition, Labelled, Resource, SortField, SortKey, SortSpec,
    Table,
};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub category_id: Option<String>,
}

impl Resource for Note {
    type Draft = NoteDraft;

    const TABLE: Table = Table::Notes;
    const DEFAULT_ORDER: SortSpec = SortSpec::newest_first();
    const INSERT_POSITION: InsertPosition = InsertPosition::Prepend;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> NoteDraft {
        NoteDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            category_id: self.category_id.clone(),
        }
    }

    fn validate(draft: &NoteDraft) -> Result<(), ValidationError> {
        require_text("title", &draft.title)
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![&self.title, &self.content]
    }

    fn category_ref(&self) -> Option<&str> {
        non_empty(&self.category_id)
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

impl Labelled for Note {
    fn label(&self) -> String {
        self.title.clone()
    }
}
