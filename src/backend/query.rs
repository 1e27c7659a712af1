use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::models::{SortDirection, Table};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier pattern"));

pub fn is_identifier(column: &str) -> bool {
    IDENTIFIER.is_match(column)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: SortDirection,
}

/// A read against one remote table: predicates are ANDed together.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl SelectQuery {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Eq, value))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Gte, value))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Lt, value))
    }

    pub fn order(mut self, column: &str, direction: SortDirection) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// Rejects column names that could not be a plain table column.
    pub fn validate(&self) -> anyhow::Result<()> {
        for filter in &self.filters {
            if !is_identifier(&filter.column) {
                anyhow::bail!("invalid filter column '{}'", filter.column);
            }
        }
        if let Some(order) = &self.order {
            if !is_identifier(&order.column) {
                anyhow::bail!("invalid order column '{}'", order.column);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_predicates_in_order() {
        let query = SelectQuery::table(Table::Expenses)
            .eq("user_id", "u1")
            .gte("date", "2024-01-01")
            .lt("date", "2024-02-01")
            .order("date", SortDirection::Descending);
        let ops: Vec<_> = query.filters.iter().map(|f| f.op).collect();
        assert_eq!(ops, vec![FilterOp::Eq, FilterOp::Gte, FilterOp::Lt]);
        assert_eq!(query.order.as_ref().map(|o| o.column.as_str()), Some("date"));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn rejects_injected_columns() {
        let query = SelectQuery::table(Table::Notes).eq("title); DROP TABLE rows;--", "x");
        assert!(query.validate().is_err());
        let ordered = SelectQuery::table(Table::Notes).order("Title", SortDirection::Ascending);
        assert!(ordered.validate().is_err());
    }
}
