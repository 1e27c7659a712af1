use indexmap::IndexMap;
use rust_decimal::Decimal;
use time::{Date, Duration, OffsetDateTime};

use crate::category::CategoryIndex;
use crate::models::{normalize_symbol, BudgetItem, CalendarEvent, Expense, Investment, MonthKey, Todo};

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category_id: String,
    pub label: String,
    pub color: String,
    pub total: Decimal,
    pub count: usize,
}

/// Spending per category, largest first. `month` narrows to one calendar
/// month.
pub fn expense_totals(
    expenses: &[Expense],
    month: Option<MonthKey>,
    categories: &CategoryIndex,
) -> Vec<CategoryTotal> {
    let mut totals: IndexMap<&str, CategoryTotal> = IndexMap::new();
    for expense in expenses
        .iter()
        .filter(|e| month.map_or(true, |m| m.contains(e.date)))
    {
        let reference = Some(expense.category_id.as_str());
        let entry = totals
            .entry(expense.category_id.as_str())
            .or_insert_with(|| CategoryTotal {
                category_id: expense.category_id.clone(),
                label: categories.label(reference).to_string(),
                color: categories.color(reference).to_string(),
                total: Decimal::ZERO,
                count: 0,
            });
        entry.total += expense.amount;
        entry.count += 1;
    }
    let mut rows: Vec<CategoryTotal> = totals.into_values().collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.label.cmp(&b.label)));
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLine {
    pub category_id: String,
    pub label: String,
    pub planned: Decimal,
    pub spent: Decimal,
}

impl BudgetLine {
    pub fn remaining(&self) -> Decimal {
        self.planned - self.spent
    }

    pub fn is_over(&self) -> bool {
        self.spent > self.planned
    }
}

/// Planned against actual spending for one month. Categories with spending
/// but no plan are listed after the planned ones with a zero budget.
pub fn budget_vs_spent(
    items: &[BudgetItem],
    expenses: &[Expense],
    month: MonthKey,
    categories: &CategoryIndex,
) -> Vec<BudgetLine> {
    let mut lines: IndexMap<String, BudgetLine> = IndexMap::new();
    let line = |category_id: &str| -> BudgetLine {
        BudgetLine {
            category_id: category_id.to_string(),
            label: categories.label(Some(category_id)).to_string(),
            planned: Decimal::ZERO,
            spent: Decimal::ZERO,
        }
    };

    for item in items.iter().filter(|i| i.month_year == month) {
        lines
            .entry(item.category_id.clone())
            .or_insert_with(|| line(&item.category_id))
            .planned += item.planned_amount;
    }
    for expense in expenses.iter().filter(|e| month.contains(e.date)) {
        lines
            .entry(expense.category_id.clone())
            .or_insert_with(|| line(&expense.category_id))
            .spent += expense.amount;
    }
    lines.into_values().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub shares: Decimal,
    pub cost_basis: Decimal,
    pub lots: usize,
}

impl Holding {
    pub fn average_price(&self) -> Option<Decimal> {
        (!self.shares.is_zero()).then(|| (self.cost_basis / self.shares).round_dp(4))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
    pub total_cost: Decimal,
}

/// Purchase lots grouped by symbol, in alphabetical order.
pub fn portfolio(investments: &[Investment]) -> Portfolio {
    let mut holdings: IndexMap<String, Holding> = IndexMap::new();
    for lot in investments {
        let symbol = normalize_symbol(&lot.symbol);
        let holding = holdings.entry(symbol.clone()).or_insert_with(|| Holding {
            symbol,
            shares: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            lots: 0,
        });
        holding.shares += lot.shares;
        holding.cost_basis += lot.cost_basis();
        holding.lots += 1;
    }
    holdings.sort_keys();
    let holdings: Vec<Holding> = holdings.into_values().collect();
    let total_cost = holdings.iter().map(|h| h.cost_basis).sum();
    Portfolio {
        holdings,
        total_cost,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoCounts {
    pub total: usize,
    pub completed: usize,
    pub open: usize,
    pub overdue: usize,
}

pub fn todo_counts(todos: &[Todo], today: Date) -> TodoCounts {
    todos.iter().fold(TodoCounts::default(), |mut counts, todo| {
        counts.total += 1;
        if todo.completed {
            counts.completed += 1;
        } else {
            counts.open += 1;
        }
        if todo.is_overdue(today) {
            counts.overdue += 1;
        }
        counts
    })
}

/// Events still running at `now` or starting within `days`, soonest first.
/// A window reaching past the last representable instant has no upper bound.
pub fn upcoming_events(events: &[CalendarEvent], now: OffsetDateTime, days: i64) -> Vec<&CalendarEvent> {
    let horizon = days
        .max(0)
        .checked_mul(86_400)
        .map(Duration::seconds)
        .and_then(|window| now.checked_add(window));
    let mut upcoming: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| event.ends_at() >= now)
        .filter(|event| horizon.map_or(true, |horizon| event.start_time < horizon))
        .collect();
    upcoming.sort_by_key(|event| event.start_time);
    upcoming
}
