use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::{
    iso_date, require_text, Labelled, Resource, SortField, SortKey, SortSpec, Table,
};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "iso_date::option")]
    pub due_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TodoDraft {
    pub text: String,
    pub completed: bool,
    #[serde(with = "iso_date::option")]
    pub due_date: Option<Date>,
}

impl Todo {
    pub fn is_overdue(&self, today: Date) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

impl Resource for Todo {
    type Draft = TodoDraft;

    const TABLE: Table = Table::Todos;
    const DEFAULT_ORDER: SortSpec = SortSpec::newest_first();

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> TodoDraft {
        TodoDraft {
            text: self.text.clone(),
            completed: self.completed,
            due_date: self.due_date,
        }
    }

    fn validate(draft: &TodoDraft) -> Result<(), ValidationError> {
        require_text("text", &draft.text)
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![&self.text]
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Title => "text",
            SortField::Date => "due_date",
            _ => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::text(&self.text),
            SortField::Date => self.due_date.map_or(SortKey::Missing, SortKey::Day),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for Todo {
    fn label(&self) -> String {
        self.text.clone()
    }
}
