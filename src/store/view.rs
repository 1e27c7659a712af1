use std::cmp::Ordering;

use once_cell::sync::Lazy;
use time::format_description::{self, FormatItem};
use time::{Date, Duration};

use crate::models::{MonthKey, Resource, SortDirection, SortField, SortKey, SortSpec};

static DATE_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day]").expect("valid date format description")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeFilter {
    pub from: Option<Date>,
    pub to: Option<Date>, // exclusive
}

impl RangeFilter {
    pub fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn month(key: MonthKey) -> Self {
        Self {
            from: Some(key.first_day()),
            to: Some(key.next().first_day()),
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date < to)
    }
}

/// Interactive controls over a cached collection. The derived view is a pure
/// function of the collection and these settings.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub search: String,
    pub category: Option<String>,
    pub sort: Option<SortSpec>,
    pub range: RangeFilter,
}

impl ViewQuery {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: text.into(),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec::new(field, direction));
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn within(mut self, range: RangeFilter) -> Self {
        self.range = range;
        self
    }
}

pub fn derive_view<'a, R: Resource>(items: &'a [R], query: &ViewQuery) -> Vec<&'a R> {
    let needle = query.search.trim().to_lowercase();
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut view: Vec<&R> = items
        .iter()
        .filter(|item| matches_search(*item, &needle))
        .filter(|item| category.map_or(true, |wanted| item.category_ref() == Some(wanted)))
        .filter(|item| !query.range.has_range() || in_range(*item, &query.range))
        .collect();

    if let Some(sort) = query.sort {
        view.sort_by(|a, b| {
            compare_directed(
                &a.sort_key(sort.field),
                &b.sort_key(sort.field),
                sort.direction,
            )
        });
    }
    view
}

/// Case-insensitive substring match over the resource's text fields; an
/// empty needle matches everything.
pub fn matches_search<R: Resource>(item: &R, needle: &str) -> bool {
    needle.is_empty()
        || item
            .search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
}

fn in_range<R: Resource>(item: &R, range: &RangeFilter) -> bool {
    match item.sort_key(SortField::Date) {
        SortKey::Day(date) => range.contains(date),
        SortKey::Timestamp(at) => range.contains(at.date()),
        _ => false,
    }
}

/// Rows without a value stay at the end in both directions.
fn compare_directed(a: &SortKey, b: &SortKey, direction: SortDirection) -> Ordering {
    match (a, b) {
        (SortKey::Missing, _) | (_, SortKey::Missing) => a.compare(b),
        _ => match direction {
            SortDirection::Ascending => a.compare(b),
            SortDirection::Descending => a.compare(b).reverse(),
        },
    }
}

/// Parses `YYYY-MM-DD`, `YYYY-MM`, or a `FROM..TO` range of either (both
/// ends optional, `TO` inclusive of the whole day or month it names).
pub fn parse_date_range(spec: &str) -> Option<RangeFilter> {
    let mut range = RangeFilter::default();
    let parts: Vec<&str> = spec.trim().split("..").collect();
    match parts.as_slice() {
        [single] => {
            let (from, to) = parse_period(single)?;
            range.from = Some(from);
            range.to = Some(to);
        }
        [from, to] => {
            if !from.is_empty() {
                range.from = Some(parse_period(from)?.0);
            }
            if !to.is_empty() {
                range.to = Some(parse_period(to)?.1);
            }
        }
        _ => return None,
    }
    Some(range)
}

fn parse_period(input: &str) -> Option<(Date, Date)> {
    if let Ok(date) = Date::parse(input, &*DATE_FORMAT) {
        return Some((date, date.checked_add(Duration::days(1))?));
    }
    let month: MonthKey = input.parse().ok()?;
    Some((month.first_day(), month.next().first_day()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Expense, Note};
    use rust_decimal::Decimal;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    fn note(id: &str, title: &str, content: &str, created: OffsetDateTime) -> Note {
        Note {
            id: id.into(),
            user_id: "u1".into(),
            title: title.into(),
            content: content.into(),
            category_id: None,
            created_at: created,
        }
    }

    fn expense(id: &str, amount: i64, category: &str, date: Date) -> Expense {
        Expense {
            id: id.into(),
            user_id: "u1".into(),
            amount: Decimal::new(amount, 2),
            category_id: category.into(),
            description: Some(format!("expense {id}")),
            date,
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn sample_notes() -> Vec<Note> {
        vec![
            note("1", "Quarterly Report", "numbers", datetime!(2024-03-01 9:00 UTC)),
            note("2", "Groceries", "milk, eggs", datetime!(2024-03-02 9:00 UTC)),
            note("3", "Trip ideas", "see the REPORTed spots", datetime!(2024-03-03 9:00 UTC)),
        ]
    }

    fn ids<R: Resource>(view: &[&R]) -> Vec<String> {
        view.iter().map(|item| item.id().to_string()).collect()
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let notes = sample_notes();
        let view = derive_view(&notes, &ViewQuery::search("report"));
        assert_eq!(ids(&view), vec!["1", "3"]);
        assert!(derive_view(&notes, &ViewQuery::search("xyz")).is_empty());
        assert_eq!(derive_view(&notes, &ViewQuery::default()).len(), 3);
    }

    #[test]
    fn search_is_pure() {
        let notes = sample_notes();
        let query = ViewQuery::search("  GROC ");
        assert_eq!(ids(&derive_view(&notes, &query)), ids(&derive_view(&notes, &query)));
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn descending_then_ascending_reverses_order() {
        let items = vec![
            expense("a", 500, "c1", date!(2024 - 02 - 10)),
            expense("b", 100, "c1", date!(2024 - 02 - 01)),
            expense("c", 300, "c2", date!(2024 - 02 - 20)),
        ];
        let desc = ids(&derive_view(
            &items,
            &ViewQuery::default().sorted(SortField::Date, SortDirection::Descending),
        ));
        let mut asc = ids(&derive_view(
            &items,
            &ViewQuery::default().sorted(SortField::Date, SortDirection::Ascending),
        ));
        assert_eq!(desc, vec!["c", "a", "b"]);
        asc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let items = vec![
            expense("first", 100, "c1", date!(2024 - 02 - 01)),
            expense("second", 100, "c1", date!(2024 - 02 - 02)),
        ];
        let view = derive_view(
            &items,
            &ViewQuery::default().sorted(SortField::Amount, SortDirection::Descending),
        );
        assert_eq!(ids(&view), vec!["first", "second"]);
    }

    #[test]
    fn category_and_range_filters_combine() {
        let items = vec![
            expense("jan", 100, "food", date!(2024 - 01 - 31)),
            expense("feb", 200, "food", date!(2024 - 02 - 01)),
            expense("feb-rent", 900, "rent", date!(2024 - 02 - 03)),
        ];
        let range = parse_date_range("2024-02").expect("month range");
        let view = derive_view(&items, &ViewQuery::default().in_category("food").within(range));
        assert_eq!(ids(&view), vec!["feb"]);
    }

    #[test]
    fn missing_values_stay_last_when_descending() {
        use crate::models::Todo;
        let todo = |id: &str, due: Option<Date>| Todo {
            id: id.into(),
            user_id: "u1".into(),
            text: id.into(),
            completed: false,
            due_date: due,
            created_at: datetime!(2024-01-01 0:00 UTC),
        };
        let items = vec![
            todo("none", None),
            todo("early", Some(date!(2024 - 01 - 02))),
            todo("late", Some(date!(2024 - 03 - 02))),
        ];
        let view = derive_view(
            &items,
            &ViewQuery::default().sorted(SortField::Date, SortDirection::Descending),
        );
        assert_eq!(ids(&view), vec!["late", "early", "none"]);
    }

    #[test]
    fn parses_open_and_closed_ranges() {
        let range = parse_date_range("2024-01-15..2024-02").expect("range");
        assert_eq!(range.from, Some(date!(2024 - 01 - 15)));
        assert_eq!(range.to, Some(date!(2024 - 03 - 01)));

        let open = parse_date_range("..2024-01-31").expect("open range");
        assert_eq!(open.from, None);
        assert_eq!(open.to, Some(date!(2024 - 02 - 01)));

        assert!(parse_date_range("yesterday").is_none());
        assert!(parse_date_range("2024-01-01..2024-02-01..2024-03-01").is_none());
    }

    #[test]
    fn month_range_ends_at_next_month() {
        let range = RangeFilter::month("2024-12".parse().expect("month"));
        assert_eq!(range.from, Some(date!(2024 - 12 - 01)));
        assert_eq!(range.to, Some(date!(2025 - 01 - 01)));
        assert!(range.contains(date!(2024 - 12 - 31)));
        assert!(!range.contains(date!(2025 - 01 - 01)));
    }
}
