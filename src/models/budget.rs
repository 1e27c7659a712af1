use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use time::{Date, Month, OffsetDateTime};

use super::{
    require_text, Labelled, Resource, SortDirection, SortField, SortKey, SortSpec, Table,
};
use crate::error::ValidationError;

/// Calendar month a budget line applies to, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: Month,
}

impl MonthKey {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    pub fn of(date: Date) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn current() -> Self {
        Self::of(OffsetDateTime::now_utc().date())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn first_day(&self) -> Date {
        Date::from_calendar_date(self.year, self.month, 1)
            .unwrap_or(Date::MIN)
    }

    pub fn next(&self) -> Self {
        match self.month {
            Month::December => Self::new(self.year + 1, Month::January),
            month => Self::new(self.year, month.next()),
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        Self::of(date) == *self
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month as u8)
    }
}

impl FromStr for MonthKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let Some((year, month)) = trimmed.split_once('-') else {
            bail!("month key '{trimmed}' must look like YYYY-MM");
        };
        if year.len() != 4 || month.len() != 2 {
            bail!("month key '{trimmed}' must look like YYYY-MM");
        }
        let year: i32 = year
            .parse()
            .map_err(|_| anyhow!("invalid year in month key '{trimmed}'"))?;
        let month: u8 = month
            .parse()
            .map_err(|_| anyhow!("invalid month in month key '{trimmed}'"))?;
        let month = Month::try_from(month)
            .map_err(|_| anyhow!("month out of range in month key '{trimmed}'"))?;
        Ok(Self::new(year, month))
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub planned_amount: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub month_year: MonthKey,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetItemDraft {
    pub category_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub planned_amount: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub month_year: MonthKey,
}

impl Default for BudgetItemDraft {
    fn default() -> Self {
        Self {
            category_id: String::new(),
            planned_amount: Decimal::ZERO,
            month_year: MonthKey::current(),
        }
    }
}

impl Resource for BudgetItem {
    type Draft = BudgetItemDraft;

    const TABLE: Table = Table::BudgetItems;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Date, SortDirection::Descending);

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> BudgetItemDraft {
        BudgetItemDraft {
            category_id: self.category_id.clone(),
            planned_amount: self.planned_amount,
            month_year: self.month_year,
        }
    }

    fn validate(draft: &BudgetItemDraft) -> Result<(), ValidationError> {
        require_text("category", &draft.category_id)?;
        if draft.planned_amount < Decimal::ZERO {
            return Err(ValidationError::new("planned_amount", "must not be negative"));
        }
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        Vec::new()
    }

    fn category_ref(&self) -> Option<&str> {
        Some(self.category_id.as_str()).filter(|id| !id.trim().is_empty())
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Date => "month_year",
            SortField::Amount => "planned_amount",
            _ => "created_at",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Date => SortKey::Day(self.month_year.first_day()),
            SortField::Amount => SortKey::Number(self.planned_amount),
            _ => SortKey::Timestamp(self.created_at),
        }
    }
}

impl Labelled for BudgetItem {
    fn label(&self) -> String {
        format!("{} budget", self.month_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_parses_and_formats() -> anyhow::Result<()> {
        let key: MonthKey = "2024-03".parse()?;
        assert_eq!(key, MonthKey::new(2024, Month::March));
        assert_eq!(key.to_string(), "2024-03");
        Ok(())
    }

    #[test]
    fn month_key_rejects_bad_input() {
        for raw in ["2024-13", "2024-3", "24-03", "march", "2024-00"] {
            assert!(raw.parse::<MonthKey>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn december_rolls_into_next_year() {
        let key = MonthKey::new(2023, Month::December);
        assert_eq!(key.next(), MonthKey::new(2024, Month::January));
        assert!(key.contains(time::macros::date!(2023 - 12 - 31)));
        assert!(!key.contains(time::macros::date!(2024 - 01 - 01)));
    }

    #[test]
    fn budget_row_round_trips_month_key_as_text() -> anyhow::Result<()> {
        let raw = r#"{
            "id": "b1",
            "user_id": "u1",
            "category_id": "c1",
            "planned_amount": 250.5,
            "month_year": "2024-05",
            "created_at": "2024-05-01T00:00:00Z"
        }"#;
        let item: BudgetItem = serde_json::from_str(raw)?;
        assert_eq!(item.month_year, MonthKey::new(2024, Month::May));
        assert_eq!(item.planned_amount, Decimal::new(2505, 1));
        let value = serde_json::to_value(&item)?;
        assert_eq!(value["month_year"], "2024-05");
        Ok(())
    }
}
