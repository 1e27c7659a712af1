use std::fmt::Write as _;

use time::OffsetDateTime;

use super::render::{money, short_id, timestamp, TextTable};
use crate::category::{CategoryIndex, UNCATEGORIZED_LABEL};
use crate::models::{
    BudgetItem, CalendarEvent, Expense, ExpenseCategory, Investment, Note, NoteCategory,
    Reference, Resource, Todo,
};

/// Category names available while rendering rows.
#[derive(Debug, Default)]
pub struct Lookup {
    pub expense: Option<CategoryIndex>,
    pub note: Option<CategoryIndex>,
}

impl Lookup {
    fn label(index: Option<&CategoryIndex>, reference: Option<&str>) -> String {
        match index {
            Some(index) => index.label(reference).to_string(),
            None => reference.unwrap_or(UNCATEGORIZED_LABEL).to_string(),
        }
    }
}

/// Tabular projection of one resource for `list` output.
pub trait Row: Resource {
    const HEADERS: &'static [&'static str];

    fn cells(&self, lookup: &Lookup) -> Vec<String>;
}

pub fn render_rows<R: Row>(rows: &[&R], lookup: &Lookup, limit: usize) -> String {
    if rows.is_empty() {
        return format!("No {} found.\n", R::TABLE.name().replace('_', " "));
    }
    let shown = if limit == 0 {
        rows.len()
    } else {
        limit.min(rows.len())
    };
    let mut table = TextTable::new(R::HEADERS.iter().copied());
    for row in &rows[..shown] {
        table.row(row.cells(lookup));
    }
    let mut out = table.render();
    if shown < rows.len() {
        let _ = writeln!(out, "... {} more (raise --limit)", rows.len() - shown);
    }
    out
}

fn optional(value: &Option<String>) -> String {
    value.as_deref().unwrap_or("").to_string()
}

impl Row for Note {
    const HEADERS: &'static [&'static str] = &["ID", "TITLE", "CATEGORY", "CREATED"];

    fn cells(&self, lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.title.clone(),
            Lookup::label(lookup.note.as_ref(), self.category_ref()),
            timestamp(self.created_at),
        ]
    }
}

impl Row for Todo {
    const HEADERS: &'static [&'static str] = &["ID", "DONE", "TEXT", "DUE"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        let today = OffsetDateTime::now_utc().date();
        let due = match self.due_date {
            Some(due) if self.is_overdue(today) => format!("{due} (overdue)"),
            Some(due) => due.to_string(),
            None => String::new(),
        };
        vec![
            short_id(&self.id).to_string(),
            if self.completed { "[x]" } else { "[ ]" }.to_string(),
            self.text.clone(),
            due,
        ]
    }
}

impl Row for CalendarEvent {
    const HEADERS: &'static [&'static str] = &["ID", "START", "END", "TITLE", "COLOR"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        let (start, end) = if self.all_day {
            (self.start_time.date().to_string(), "all day".to_string())
        } else {
            (
                timestamp(self.start_time),
                self.end_time.map(timestamp).unwrap_or_default(),
            )
        };
        vec![
            short_id(&self.id).to_string(),
            start,
            end,
            self.title.clone(),
            self.color.map(|c| c.to_string()).unwrap_or_default(),
        ]
    }
}

impl Row for Reference {
    const HEADERS: &'static [&'static str] = &["ID", "TITLE", "URL", "TAGS"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.title.clone(),
            self.url.clone(),
            self.tags.join(", "),
        ]
    }
}

impl Row for Expense {
    const HEADERS: &'static [&'static str] = &["ID", "DATE", "AMOUNT", "CATEGORY", "DESCRIPTION"];

    fn cells(&self, lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.date.to_string(),
            money(self.amount),
            Lookup::label(lookup.expense.as_ref(), self.category_ref()),
            optional(&self.description),
        ]
    }
}

impl Row for Investment {
    const HEADERS: &'static [&'static str] =
        &["ID", "SYMBOL", "SHARES", "PRICE", "COST", "PURCHASED"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.symbol.clone(),
            self.shares.normalize().to_string(),
            money(self.purchase_price),
            money(self.cost_basis()),
            self.purchase_date.to_string(),
        ]
    }
}

impl Row for BudgetItem {
    const HEADERS: &'static [&'static str] = &["ID", "MONTH", "CATEGORY", "PLANNED"];

    fn cells(&self, lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.month_year.to_string(),
            Lookup::label(lookup.expense.as_ref(), self.category_ref()),
            money(self.planned_amount),
        ]
    }
}

impl Row for ExpenseCategory {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "COLOR", "ICON"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.name.clone(),
            self.color.clone(),
            self.icon()
                .map(|icon| format!("{} {icon}", icon.glyph()))
                .unwrap_or_default(),
        ]
    }
}

impl Row for NoteCategory {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "COLOR"];

    fn cells(&self, _lookup: &Lookup) -> Vec<String> {
        vec![
            short_id(&self.id).to_string(),
            self.name.clone(),
            self.color.clone(),
        ]
    }
}
