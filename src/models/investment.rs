use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::{
    iso_date, non_empty, require_text, Labelled, Resource, SortDirection, SortField, SortKey,
    SortSpec, Table,
};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub purchase_price: Decimal,
    #[serde(with = "iso_date")]
    pub purchase_date: Date,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentDraft {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub purchase_price: Decimal,
    #[serde(with = "iso_date")]
    pub purchase_date: Date,
    pub notes: Option<String>,
}

impl Default for InvestmentDraft {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            shares: Decimal::ZERO,
            purchase_price: Decimal::ZERO,
            purchase_date: OffsetDateTime::now_utc().date(),
            notes: None,
        }
    }
}

impl Investment {
    pub fn cost_basis(&self) -> Decimal {
        self.shares * self.purchase_price
    }
}

/// Ticker symbols are stored upper-cased without surrounding whitespace.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl Resource for Investment {
    type Draft = InvestmentDraft;

    const TABLE: Table = Table::Investments;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Date, SortDirection::Descending);

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> InvestmentDraft {
        InvestmentDraft {
            symbol: self.symbol.clone(),
            shares: self.shares,
            purchase_price: self.purchase_price,
            purchase_date: self.purchase_date,
            notes: self.notes.clone(),
        }
    }

    fn validate(draft: &InvestmentDraft) -> Result<(), ValidationError> {
        require_text("symbol", &draft.symbol)?;
        if draft.shares <= Decimal::ZERO {
            return Err(ValidationError::new("shares", "must be greater than zero"));
        }
        if draft.purchase_price < Decimal::ZERO {
            return Err(ValidationError::new("purchase_price", "must not be negative"));
        }
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.symbol.as_str()];
        if let Some(notes) = non_empty(&self.notes) {
            fields.push(notes);
        }
        fields
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Title => "symbol",
            SortField::Date => "purchase_date",
            SortField::Amount => "purchase_price",
            SortField::Created => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::text(&self.symbol),
            SortField::Date => SortKey::Day(self.purchase_date),
            SortField::Amount => SortKey::Number(self.cost_basis()),
            SortField::Created => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for Investment {
    fn label(&self) -> String {
        format!("{} x{}", self.symbol, self.shares.normalize())
    }
}
