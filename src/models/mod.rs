use std::cmp::Ordering;
use std::fmt::Debug;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use time::{Date, OffsetDateTime};

use crate::error::ValidationError;

mod budget;
mod category;
mod event;
mod expense;
mod investment;
mod note;
mod reference;
mod todo;

pub use budget::{BudgetItem, BudgetItemDraft, MonthKey};
pub use category::{CategoryDraft, ExpenseCategory, NoteCategory};
pub use event::{CalendarEvent, CalendarEventDraft, EventColor};
pub use expense::{Expense, ExpenseDraft};
pub use investment::{normalize_symbol, Investment, InvestmentDraft};
pub use note::{Note, NoteDraft};
pub use reference::{is_valid_url, parse_tags, Reference, ReferenceDraft};
pub use todo::{Todo, TodoDraft};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Remote tables known to the application. Names match the hosted schema.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Notes,
    NoteCategories,
    Todos,
    CalendarEvents,
    References,
    Expenses,
    ExpenseCategories,
    Investments,
    BudgetItems,
}

impl Table {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Interactive sort selector. Resources map each field onto one of their own
/// columns; fields a resource has no column for fall back to creation time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SortField {
    #[default]
    Created,
    Title,
    Date,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub const fn newest_first() -> Self {
        Self::new(SortField::Created, SortDirection::Descending)
    }
}

/// Comparable projection of one entity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Text(String),
    Timestamp(OffsetDateTime),
    Day(Date),
    Number(Decimal),
    Missing,
}

impl SortKey {
    pub fn text(value: &str) -> Self {
        SortKey::Text(value.to_lowercase())
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Timestamp(a), SortKey::Timestamp(b)) => a.cmp(b),
            (SortKey::Day(a), SortKey::Day(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.cmp(b),
            (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
            // rows without a value sink to the end of an ascending list
            (SortKey::Missing, _) => Ordering::Greater,
            (_, SortKey::Missing) => Ordering::Less,
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Prepend,
    Append,
}

/// Everything the generic store needs to know about one entity type.
pub trait Resource: Clone + Debug + DeserializeOwned + Serialize + Labelled {
    type Draft: Clone + Debug + Serialize + Default;

    const TABLE: Table;
    /// Column the primary fetch orders by.
    const DEFAULT_ORDER: SortSpec;
    const INSERT_POSITION: InsertPosition = InsertPosition::Prepend;

    fn id(&self) -> &str;
    fn created_at(&self) -> OffsetDateTime;

    /// Editable fields of an existing row, used to seed the edit dialog.
    fn to_draft(&self) -> Self::Draft;

    fn validate(draft: &Self::Draft) -> Result<(), ValidationError>;

    /// Text fields the search box matches against.
    fn search_fields(&self) -> Vec<&str>;

    fn category_ref(&self) -> Option<&str> {
        None
    }

    /// Remote column backing an interactive sort field, if any.
    fn order_column(field: SortField) -> &'static str;

    fn sort_key(&self, field: SortField) -> SortKey;
}

/// Short human label for list output and notifications.
pub trait Labelled {
    fn label(&self) -> String;
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn table_names_match_remote_schema() {
        assert_eq!(Table::CalendarEvents.name(), "calendar_events");
        assert_eq!(Table::CalendarEvents.to_string(), "calendar_events");
        assert_eq!(Table::from_str("budget_items").ok(), Some(Table::BudgetItems));
    }

    #[test]
    fn missing_keys_sort_last() {
        let present = SortKey::text("a");
        assert_eq!(present.compare(&SortKey::Missing), Ordering::Less);
        assert_eq!(SortKey::Missing.compare(&present), Ordering::Greater);
    }

    #[test]
    fn sort_selectors_parse_case_insensitively() {
        assert_eq!(SortField::from_str("Amount").ok(), Some(SortField::Amount));
        assert_eq!(
            SortDirection::from_str("ascending").ok(),
            Some(SortDirection::Ascending)
        );
    }
}
