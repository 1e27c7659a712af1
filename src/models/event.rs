use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use strum::{Display, EnumIter, EnumString};
use time::OffsetDateTime;

use super::{
    non_empty, require_text, InsertPosition, Labelled, Resource, SortDirection, SortField,
    SortKey, SortSpec, Table,
};
use crate::error::ValidationError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventColor {
    Blue,
    Green,
    Red,
    Purple,
    Orange,
    Pink,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub all_day: bool,
    /// Colors outside the known set, written by other clients, read as none.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub color: Option<EventColor>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEventDraft {
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub all_day: bool,
    pub color: Option<EventColor>,
}

impl Default for CalendarEventDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            all_day: false,
            color: None,
        }
    }
}

impl CalendarEvent {
    /// Last instant the event occupies; open-ended events end where they start.
    pub fn ends_at(&self) -> OffsetDateTime {
        self.end_time.unwrap_or(self.start_time)
    }
}

impl Resource for CalendarEvent {
    type Draft = CalendarEventDraft;

    const TABLE: Table = Table::CalendarEvents;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Date, SortDirection::Ascending);
    const INSERT_POSITION: InsertPosition = InsertPosition::Append;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> CalendarEventDraft {
        CalendarEventDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            all_day: self.all_day,
            color: self.color,
        }
    }

    fn validate(draft: &CalendarEventDraft) -> Result<(), ValidationError> {
        require_text("title", &draft.title)?;
        if let Some(end) = draft.end_time {
            if end < draft.start_time {
                return Err(ValidationError::new(
                    "end_time",
                    "must not be before the start time",
                ));
            }
        }
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str()];
        if let Some(description) = non_empty(&self.description) {
            fields.push(description);
        }
        fields
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Title => "title",
            SortField::Date => "start_time",
            _ => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::text(&self.title),
            SortField::Date => SortKey::Timestamp(self.start_time),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for CalendarEvent {
    fn label(&self) -> String {
        self.title.clone()
    }
}
