use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::{
    iso_date, non_empty, require_text, Labelled, Resource, SortDirection, SortField, SortKey,
    SortSpec, Table,
};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseDraft {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category_id: String,
    pub description: Option<String>,
    #[serde(with = "iso_date")]
    pub date: Date,
}

impl Default for ExpenseDraft {
    fn default() -> Self {
        Self {
            amount: Decimal::ZERO,
            category_id: String::new(),
            description: None,
            date: OffsetDateTime::now_utc().date(),
        }
    }
}

impl Resource for Expense {
    type Draft = ExpenseDraft;

    const TABLE: Table = Table::Expenses;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Date, SortDirection::Descending);

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> ExpenseDraft {
        ExpenseDraft {
            amount: self.amount,
            category_id: self.category_id.clone(),
            description: self.description.clone(),
            date: self.date,
        }
    }

    fn validate(draft: &ExpenseDraft) -> Result<(), ValidationError> {
        if draft.amount <= Decimal::ZERO {
            return Err(ValidationError::new("amount", "must be greater than zero"));
        }
        require_text("category", &draft.category_id)
    }

    fn search_fields(&self) -> Vec<&str> {
        non_empty(&self.description).into_iter().collect()
    }

    fn category_ref(&self) -> Option<&str> {
        Some(self.category_id.as_str()).filter(|id| !id.trim().is_empty())
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Title => "description",
            SortField::Date => "date",
            SortField::Amount => "amount",
            SortField::Created => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => non_empty(&self.description).map_or(SortKey::Missing, SortKey::text),
            SortField::Date => SortKey::Day(self.date),
            SortField::Amount => SortKey::Number(self.amount),
            SortField::Created => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for Expense {
    fn label(&self) -> String {
        non_empty(&self.description)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} on {}", self.amount, self.date))
    }
}
