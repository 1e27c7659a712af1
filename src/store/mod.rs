use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{Backend, Filter, SelectQuery};
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::models::{InsertPosition, Resource, SortSpec};
use crate::notify::Notifier;
use crate::session::{Session, SessionContext};

mod view;

pub use view::{derive_view, matches_search, parse_date_range, RangeFilter, ViewQuery};

/// Monotonic counter that tells stores their cached rows may be out of date.
#[derive(Debug, Clone, Default)]
pub struct RefreshTrigger(Arc<AtomicU64>);

impl RefreshTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the signed-in user owns in one table, cached in memory.
///
/// Remote writes are awaited before the cache changes, so a failed call
/// leaves the collection exactly as it was. Rows returned by the backend are
/// authoritative: ids and timestamps never originate here.
pub struct ResourceStore<R: Resource> {
    backend: Arc<dyn Backend>,
    session: SessionContext,
    notifier: Notifier,
    order: SortSpec,
    scope: Vec<Filter>,
    invalidates: Option<RefreshTrigger>,
    items: Vec<R>,
    loaded: bool,
    seen_trigger: Option<u64>,
}

impl<R: Resource> ResourceStore<R> {
    pub fn new(backend: Arc<dyn Backend>, session: SessionContext, notifier: Notifier) -> Self {
        Self {
            backend,
            session,
            notifier,
            order: R::DEFAULT_ORDER,
            scope: Vec::new(),
            invalidates: None,
            items: Vec::new(),
            loaded: false,
            seen_trigger: None,
        }
    }

    /// Ordering requested from the backend for the primary fetch.
    pub fn with_order(mut self, order: SortSpec) -> Self {
        self.order = order;
        self
    }

    /// Extra predicate ANDed with the owner predicate on every fetch.
    pub fn with_scope(mut self, filter: Filter) -> Self {
        self.scope.push(filter);
        self
    }

    /// Trigger bumped after each successful mutation, for stores that cache
    /// rows derived from this table.
    pub fn invalidating(mut self, trigger: RefreshTrigger) -> Self {
        self.invalidates = Some(trigger);
        self
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn order(&self) -> SortSpec {
        self.order
    }

    pub fn view(&self, query: &ViewQuery) -> Vec<&R> {
        derive_view(&self.items, query)
    }

    pub fn select_query(&self, session: &Session) -> SelectQuery {
        let mut query = SelectQuery::table(R::TABLE).eq("user_id", session.user_id.as_str());
        for filter in &self.scope {
            query = query.filter(filter.clone());
        }
        query.order(R::order_column(self.order.field), self.order.direction)
    }

    /// Initial load; identical to [`ResourceStore::fetch`].
    pub fn mount(&mut self) -> StoreResult<usize> {
        self.fetch()
    }

    /// Replaces the collection with the backend's rows. On failure the
    /// previous collection is kept untouched.
    pub fn fetch(&mut self) -> StoreResult<usize> {
        let session = self.session.require()?;
        let query = self.select_query(&session);
        let rows = self
            .backend
            .select(&session, &query)
            .map_err(|err| self.remote_failure(format!("load {}", R::TABLE), err))?;
        let decoded = rows
            .into_iter()
            .map(decode::<R>)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|err| self.remote_failure(format!("load {}", R::TABLE), err))?;
        tracing::debug!(table = %R::TABLE, rows = decoded.len(), "fetched");
        self.items = decoded;
        self.loaded = true;
        Ok(self.items.len())
    }

    /// Refetches when `trigger` moved since the last successful sync.
    pub fn sync(&mut self, trigger: &RefreshTrigger) -> StoreResult<bool> {
        let current = trigger.value();
        if self.loaded && self.seen_trigger == Some(current) {
            return Ok(false);
        }
        self.fetch()?;
        self.seen_trigger = Some(current);
        Ok(true)
    }

    pub fn create(&mut self, draft: &R::Draft) -> StoreResult<R> {
        self.check(draft)?;
        let session = self.session.require()?;
        let payload = encode(draft).map_err(|err| self.remote_failure("encode draft".into(), err))?;
        let created = self
            .backend
            .insert(&session, R::TABLE, &payload)
            .and_then(decode::<R>)
            .map_err(|err| self.remote_failure(format!("create {}", R::TABLE), err))?;

        if let Some(existing) = self.items.iter_mut().find(|item| item.id() == created.id()) {
            *existing = created.clone();
        } else {
            match R::INSERT_POSITION {
                InsertPosition::Prepend => self.items.insert(0, created.clone()),
                InsertPosition::Append => self.items.push(created.clone()),
            }
        }
        self.mutated();
        self.notifier.info(format!("Created \"{}\"", created.label()));
        Ok(created)
    }

    pub fn update(&mut self, id: &str, draft: &R::Draft) -> StoreResult<R> {
        self.check(draft)?;
        let session = self.session.require()?;
        let payload = encode(draft).map_err(|err| self.remote_failure("encode draft".into(), err))?;
        let updated = self
            .backend
            .update(&session, R::TABLE, id, &payload)
            .and_then(decode::<R>)
            .map_err(|err| self.remote_failure(format!("update {} {id}", R::TABLE), err))?;

        match self.items.iter_mut().find(|item| item.id() == updated.id()) {
            Some(existing) => *existing = updated.clone(),
            // not cached here; the next fetch brings it in
            None => tracing::debug!(table = %R::TABLE, id, "updated row not in cache"),
        }
        self.mutated();
        self.notifier.info(format!("Updated \"{}\"", updated.label()));
        Ok(updated)
    }

    /// Inserts when `id` is `None`, otherwise updates that row.
    pub fn save(&mut self, id: Option<&str>, draft: &R::Draft) -> StoreResult<R> {
        match id {
            Some(id) => self.update(id, draft),
            None => self.create(draft),
        }
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        let session = self.session.require()?;
        self.backend
            .delete(&session, R::TABLE, id)
            .map_err(|err| self.remote_failure(format!("delete {} {id}", R::TABLE), err))?;
        let label = self.get(id).map(|item| item.label());
        self.items.retain(|item| item.id() != id);
        self.mutated();
        self.notifier.info(match label {
            Some(label) => format!("Deleted \"{label}\""),
            None => format!("Deleted {} {id}", R::TABLE),
        });
        Ok(())
    }

    fn check(&self, draft: &R::Draft) -> StoreResult<()> {
        R::validate(draft).map_err(|err: ValidationError| {
            self.notifier.error(err.to_string());
            StoreError::Validation(err)
        })
    }

    fn mutated(&self) {
        if let Some(trigger) = &self.invalidates {
            trigger.bump();
        }
    }

    fn remote_failure(&self, action: String, err: anyhow::Error) -> StoreError {
        tracing::error!(?err, table = %R::TABLE, %action, "backend call failed");
        self.notifier.error(format!("Could not {action}: {err:#}"));
        StoreError::remote(action, err)
    }
}

fn encode<T: serde::Serialize>(draft: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(draft)?)
}

fn decode<R: Resource>(row: Value) -> anyhow::Result<R> {
    serde_json::from_value(row).map_err(|err| anyhow::anyhow!("decoding {} row: {err}", R::TABLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FilterOp;
    use crate::models::{
        CalendarEvent, CategoryDraft, EventColor, Expense, ExpenseCategory, ExpenseDraft, Note,
        NoteDraft, SortDirection, SortField, Table,
    };
    use crate::notify::Level;
    use crate::testing::Harness;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;
    use time::macros::date;

    fn note_draft(title: &str) -> NoteDraft {
        NoteDraft {
            title: title.into(),
            content: format!("{title} body"),
            category_id: None,
        }
    }

    #[test]
    fn fetch_failure_keeps_previous_collection() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        notes.create(&note_draft("Kept"))?;
        notes.fetch()?;
        let before = notes.items().to_vec();

        harness.backend.fail_next_calls(1);
        let err = notes.fetch().unwrap_err();
        assert_matches!(err, StoreError::Remote { .. });
        assert_eq!(notes.items(), before.as_slice());
        assert!(harness
            .notifier
            .drain()
            .iter()
            .any(|n| n.level == Level::Error && n.message.contains("load notes")));
        Ok(())
    }

    #[test]
    fn empty_required_field_never_reaches_backend() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let calls = harness.backend.calls();

        let err = notes.create(&note_draft("   ")).unwrap_err();
        assert_matches!(err, StoreError::Validation(ref v) if v.field == "title");
        assert_eq!(harness.backend.calls(), calls);
        assert!(notes.is_empty());
        Ok(())
    }

    #[test]
    fn created_row_appears_once_with_server_id() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        notes.mount()?;
        let created = notes.create(&note_draft("Quarterly Report"))?;
        assert!(!created.id.is_empty());
        assert_eq!(created.user_id, harness.session()?.user_id);
        assert_eq!(
            notes.items().iter().filter(|n| n.id == created.id).count(),
            1
        );

        notes.fetch()?;
        assert_eq!(
            notes.items().iter().filter(|n| n.id == created.id).count(),
            1
        );
        Ok(())
    }

    #[test]
    fn newest_rows_are_prepended() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        notes.create(&note_draft("First"))?;
        notes.create(&note_draft("Second"))?;
        let titles: Vec<_> = notes.items().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        Ok(())
    }

    #[test]
    fn deleted_row_never_reappears() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let keep = notes.create(&note_draft("Keep"))?;
        let gone = notes.create(&note_draft("Gone"))?;
        notes.delete(&gone.id)?;

        for query in [
            ViewQuery::default(),
            ViewQuery::search("gone"),
            ViewQuery::default().sorted(SortField::Title, SortDirection::Ascending),
        ] {
            assert!(notes.view(&query).iter().all(|n| n.id != gone.id));
        }
        notes.fetch()?;
        assert!(notes.get(&gone.id).is_none());
        assert!(notes.get(&keep.id).is_some());
        Ok(())
    }

    #[test]
    fn update_replaces_by_id() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let original = notes.create(&note_draft("Draft"))?;
        notes.create(&note_draft("Other"))?;

        let mut draft = original.to_draft();
        draft.title = "Final".into();
        let updated = notes.update(&original.id, &draft)?;

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes.get(&original.id).map(|n| n.title.as_str()), Some("Final"));
        Ok(())
    }

    #[test]
    fn update_of_uncached_row_leaves_collection_alone() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut writer = harness.store::<Note>();
        let original = writer.create(&note_draft("Elsewhere"))?;

        let mut notes = harness.store::<Note>();
        let mut draft = original.to_draft();
        draft.title = "Renamed".into();
        let updated = notes.update(&original.id, &draft)?;
        assert_eq!(updated.title, "Renamed");
        assert!(notes.is_empty());

        notes.fetch()?;
        assert_eq!(notes.get(&original.id).map(|n| n.title.as_str()), Some("Renamed"));
        Ok(())
    }

    #[test]
    fn failed_mutations_leave_cache_untouched() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let original = notes.create(&note_draft("Stable"))?;
        let before = notes.items().to_vec();

        harness.backend.fail_next_calls(2);
        let mut draft = original.to_draft();
        draft.title = "Changed".into();
        assert!(notes.update(&original.id, &draft).is_err());
        assert!(notes.delete(&original.id).is_err());
        assert_eq!(notes.items(), before.as_slice());

        // no retry happened: the row is still unchanged remotely
        notes.fetch()?;
        assert_eq!(notes.get(&original.id).map(|n| n.title.as_str()), Some("Stable"));
        Ok(())
    }

    #[test]
    fn signed_out_store_reports_auth_required_without_remote_call() -> anyhow::Result<()> {
        let harness = Harness::signed_out()?;
        let mut notes = harness.store::<Note>();
        assert_matches!(notes.fetch(), Err(StoreError::AuthRequired));
        assert_matches!(notes.create(&note_draft("x")), Err(StoreError::AuthRequired));
        assert_eq!(harness.backend.calls(), 0);
        Ok(())
    }

    #[test]
    fn scoped_fetch_only_loads_matching_rows() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut all = harness.store::<Expense>();
        for (day, cents) in [(date!(2024 - 01 - 31), 500), (date!(2024 - 02 - 02), 1200)] {
            all.create(&ExpenseDraft {
                amount: Decimal::new(cents, 2),
                category_id: "c1".into(),
                description: None,
                date: day,
            })?;
        }
        let mut february = harness
            .store::<Expense>()
            .with_scope(Filter::new("date", FilterOp::Gte, "2024-02-01"))
            .with_scope(Filter::new("date", FilterOp::Lt, "2024-03-01"));
        assert_eq!(february.fetch()?, 1);
        assert_eq!(february.items()[0].amount, Decimal::new(1200, 2));
        Ok(())
    }

    #[test]
    fn category_mutations_trigger_dependent_refresh() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let trigger = RefreshTrigger::new();
        let mut editor = harness
            .store::<ExpenseCategory>()
            .invalidating(trigger.clone());
        let mut picker = harness.store::<ExpenseCategory>();

        assert!(picker.sync(&trigger)?);
        assert!(!picker.sync(&trigger)?);
        let calls = harness.backend.calls();

        editor.create(&CategoryDraft {
            name: "Travel".into(),
            color: "#3b82f6".into(),
            icon: None,
        })?;
        assert!(picker.sync(&trigger)?);
        assert_eq!(picker.len(), 1);
        assert_eq!(harness.backend.calls(), calls + 2);
        Ok(())
    }

    #[test]
    fn row_with_unknown_color_does_not_hide_the_others() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let session = harness.session()?;
        for (title, color) in [("Standup", "blue"), ("Imported", "yellow")] {
            harness.backend.insert(
                &session,
                Table::CalendarEvents,
                &serde_json::json!({
                    "title": title,
                    "start_time": "2024-06-10T09:00:00Z",
                    "all_day": false,
                    "color": color,
                }),
            )?;
        }
        let mut events = harness.store::<CalendarEvent>();
        assert_eq!(events.fetch()?, 2);
        let colors: Vec<_> = events
            .items()
            .iter()
            .map(|e| (e.title.as_str(), e.color))
            .collect();
        assert!(colors.contains(&("Standup", Some(EventColor::Blue))));
        assert!(colors.contains(&("Imported", None)));
        Ok(())
    }

    #[test]
    fn primary_fetch_uses_requested_order() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness
            .store::<Note>()
            .with_order(SortSpec::new(SortField::Title, SortDirection::Ascending));
        for title in ["beta", "alpha", "gamma"] {
            notes.create(&note_draft(title))?;
        }
        notes.fetch()?;
        let titles: Vec<_> = notes.items().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha", "beta", "gamma"]);
        Ok(())
    }
}
