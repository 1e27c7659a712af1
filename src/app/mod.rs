use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::backend::{Backend, LocalBackend, RestBackend};
use crate::category::CategoryIndex;
use crate::config::{AppConfig, BackendKind, ConfigPaths};
use crate::error::StoreResult;
use crate::models::{ExpenseCategory, NoteCategory, Resource, SortSpec, Table};
use crate::notify::Notifier;
use crate::session::{AuthEvent, SessionContext};
use crate::store::{RefreshTrigger, ResourceStore};

/// Process-wide wiring: one backend, one session, one notification queue.
/// Stores are cheap to build and are created per command, except the two
/// category lists, which are cached and refreshed through their triggers.
pub struct App {
    pub config: Arc<AppConfig>,
    backend: Arc<dyn Backend>,
    session: SessionContext,
    notifier: Notifier,
    note_categories: RefreshTrigger,
    expense_categories: RefreshTrigger,
    note_category_cache: Mutex<ResourceStore<NoteCategory>>,
    expense_category_cache: Mutex<ResourceStore<ExpenseCategory>>,
}

impl App {
    pub fn new(config: Arc<AppConfig>, paths: &ConfigPaths) -> Result<Self> {
        let backend: Arc<dyn Backend> = match config.backend.kind {
            BackendKind::Local => Arc::new(
                LocalBackend::open(&config.storage).context("opening local backend")?,
            ),
            BackendKind::Remote => Arc::new(
                RestBackend::new(&config.backend).context("configuring remote backend")?,
            ),
        };
        let session = SessionContext::restore(&paths.session_file)
            .context("restoring saved session")?;
        Ok(Self::with_parts(config, backend, session))
    }

    pub fn with_parts(
        config: Arc<AppConfig>,
        backend: Arc<dyn Backend>,
        session: SessionContext,
    ) -> Self {
        let note_categories = RefreshTrigger::new();
        let expense_categories = RefreshTrigger::new();
        let triggers = (note_categories.clone(), expense_categories.clone());
        session.on_change(move |event| {
            match event {
                AuthEvent::SignedIn { email, .. } => tracing::info!(%email, "signed in"),
                AuthEvent::SignedOut => tracing::info!("signed out"),
            }
            // cached categories belong to the previous user
            triggers.0.bump();
            triggers.1.bump();
        });
        let notifier = Notifier::new();
        let note_category_cache = Mutex::new(cached_store(&config, &backend, &session, &notifier));
        let expense_category_cache =
            Mutex::new(cached_store(&config, &backend, &session, &notifier));
        Self {
            config,
            backend,
            session,
            notifier,
            note_categories,
            expense_categories,
            note_category_cache,
            expense_category_cache,
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Trigger bumped by mutations of a category table.
    pub fn category_trigger(&self, table: Table) -> Option<&RefreshTrigger> {
        match table {
            Table::NoteCategories => Some(&self.note_categories),
            Table::ExpenseCategories => Some(&self.expense_categories),
            _ => None,
        }
    }

    /// A store for `R` ordered by the configured default for its table.
    pub fn store<R: Resource>(&self) -> ResourceStore<R> {
        let order = sort_for::<R>(&self.config);
        let store = ResourceStore::new(
            self.backend.clone(),
            self.session.clone(),
            self.notifier.clone(),
        )
        .with_order(order);
        match self.category_trigger(R::TABLE) {
            Some(trigger) => store.invalidating(trigger.clone()),
            None => store,
        }
    }

    /// Expense categories, refetched only when a category mutation or an
    /// auth change moved the trigger since the last load.
    pub fn expense_categories(&self) -> StoreResult<CategoryIndex> {
        let mut store = self.expense_category_cache.lock();
        store.sync(&self.expense_categories)?;
        Ok(CategoryIndex::for_expenses(store.items()))
    }

    pub fn note_categories(&self) -> StoreResult<CategoryIndex> {
        let mut store = self.note_category_cache.lock();
        store.sync(&self.note_categories)?;
        Ok(CategoryIndex::for_notes(store.items()))
    }
}

fn sort_for<R: Resource>(config: &AppConfig) -> SortSpec {
    config.views.sort_for(R::TABLE).unwrap_or(R::DEFAULT_ORDER)
}

fn cached_store<R: Resource>(
    config: &AppConfig,
    backend: &Arc<dyn Backend>,
    session: &SessionContext,
    notifier: &Notifier,
) -> ResourceStore<R> {
    ResourceStore::new(backend.clone(), session.clone(), notifier.clone())
        .with_order(sort_for::<R>(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CategoryDraft, Note, NoteDraft, SortDirection, SortField, SortSpec, Todo,
    };
    use crate::backend::Credentials;
    use crate::testing::{Harness, TEST_PASSWORD};
    use std::collections::BTreeMap;

    fn app(harness: &Harness, config: AppConfig) -> App {
        let backend: Arc<dyn Backend> = harness.backend.clone();
        App::with_parts(Arc::new(config), backend, harness.session.clone())
    }

    #[test]
    fn stores_use_configured_sort() -> Result<()> {
        let harness = Harness::signed_in()?;
        let mut config = AppConfig::default();
        config.views.sort = BTreeMap::from([(
            "notes".to_string(),
            SortSpec::new(SortField::Title, SortDirection::Ascending),
        )]);
        let app = app(&harness, config);
        assert_eq!(
            app.store::<Note>().order(),
            SortSpec::new(SortField::Title, SortDirection::Ascending)
        );
        assert_eq!(app.store::<Todo>().order(), Todo::DEFAULT_ORDER);
        Ok(())
    }

    #[test]
    fn category_index_reflects_new_categories() -> Result<()> {
        let harness = Harness::signed_in()?;
        let app = app(&harness, AppConfig::default());
        let mut notes = app.store::<Note>();
        let note = notes.create(&NoteDraft {
            title: "Ideas".into(),
            ..NoteDraft::default()
        })?;
        assert_eq!(app.note_categories()?.label(note.category_ref()), "General");

        let category = app.store::<NoteCategory>().create(&CategoryDraft {
            name: "Work".into(),
            color: "#22c55e".into(),
            icon: None,
        })?;
        let mut draft = note.to_draft();
        draft.category_id = Some(category.id.clone());
        let note = notes.update(&note.id, &draft)?;
        assert_eq!(app.note_categories()?.label(note.category_ref()), "Work");
        Ok(())
    }

    #[test]
    fn category_index_is_cached_until_trigger_moves() -> Result<()> {
        let harness = Harness::signed_in()?;
        let app = app(&harness, AppConfig::default());
        assert!(app.expense_categories()?.is_empty());
        let calls = harness.backend.calls();

        assert!(app.expense_categories()?.is_empty());
        assert_eq!(harness.backend.calls(), calls);

        app.store::<ExpenseCategory>().create(&CategoryDraft {
            name: "Travel".into(),
            color: "#3b82f6".into(),
            icon: None,
        })?;
        let index = app.expense_categories()?;
        assert!(index.find_by_name("travel").is_some());
        assert_eq!(harness.backend.calls(), calls + 2);
        Ok(())
    }

    #[test]
    fn auth_change_drops_cached_categories() -> Result<()> {
        let harness = Harness::signed_in()?;
        let app = app(&harness, AppConfig::default());
        app.store::<NoteCategory>().create(&CategoryDraft {
            name: "Work".into(),
            color: "#22c55e".into(),
            icon: None,
        })?;
        assert_eq!(app.note_categories()?.len(), 1);

        app.session().sign_out(app.backend())?;
        let creds = Credentials::new("second@example.com", TEST_PASSWORD)?;
        app.session().sign_up(app.backend(), &creds)?;
        assert!(app.note_categories()?.is_empty());
        Ok(())
    }

}
