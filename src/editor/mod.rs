use crate::category::{parse_icon, search_icons, ColorPalette, IconName};
use crate::error::StoreResult;
use crate::models::{
    BudgetItemDraft, CategoryDraft, ExpenseDraft, NoteDraft, Resource,
};
use crate::store::ResourceStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DialogState<D> {
    Closed,
    Creating { draft: D },
    Editing { id: String, draft: D },
}

/// Form for one entity. Opening seeds a draft, saving issues exactly one
/// insert or update, and only a successful save or delete closes it.
#[derive(Debug, Clone)]
pub struct EditorDialog<R: Resource> {
    state: DialogState<R::Draft>,
}

impl<R: Resource> Default for EditorDialog<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> EditorDialog<R> {
    pub fn new() -> Self {
        Self {
            state: DialogState::Closed,
        }
    }

    pub fn state(&self) -> &DialogState<R::Draft> {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, DialogState::Closed)
    }

    pub fn open_new(&mut self) -> &mut R::Draft {
        self.open_with(R::Draft::default())
    }

    pub fn open_with(&mut self, draft: R::Draft) -> &mut R::Draft {
        self.state = DialogState::Creating { draft };
        match &mut self.state {
            DialogState::Creating { draft } => draft,
            _ => unreachable!("state was just set to Creating"),
        }
    }

    pub fn open_edit(&mut self, item: &R) -> &mut R::Draft {
        self.state = DialogState::Editing {
            id: item.id().to_string(),
            draft: item.to_draft(),
        };
        match &mut self.state {
            DialogState::Editing { draft, .. } => draft,
            _ => unreachable!("state was just set to Editing"),
        }
    }

    pub fn editing_id(&self) -> Option<&str> {
        match &self.state {
            DialogState::Editing { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&R::Draft> {
        match &self.state {
            DialogState::Closed => None,
            DialogState::Creating { draft } | DialogState::Editing { draft, .. } => Some(draft),
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut R::Draft> {
        match &mut self.state {
            DialogState::Closed => None,
            DialogState::Creating { draft } | DialogState::Editing { draft, .. } => Some(draft),
        }
    }

    pub fn cancel(&mut self) {
        self.state = DialogState::Closed;
    }

    /// Submits the draft. `Ok(None)` means nothing was open. On error the
    /// dialog stays open with the draft intact.
    pub fn save(&mut self, store: &mut ResourceStore<R>) -> StoreResult<Option<R>> {
        let saved = match &self.state {
            DialogState::Closed => return Ok(None),
            DialogState::Creating { draft } => store.create(draft)?,
            DialogState::Editing { id, draft } => store.update(id, draft)?,
        };
        self.state = DialogState::Closed;
        Ok(Some(saved))
    }

    /// Deletes the row being edited. A create dialog has nothing to delete.
    pub fn delete(&mut self, store: &mut ResourceStore<R>) -> StoreResult<bool> {
        let DialogState::Editing { id, .. } = &self.state else {
            return Ok(false);
        };
        store.delete(id)?;
        self.state = DialogState::Closed;
        Ok(true)
    }
}

/// Drafts that reference a category by soft id.
pub trait CategoryField {
    fn set_category(&mut self, id: &str);
}

impl CategoryField for NoteDraft {
    fn set_category(&mut self, id: &str) {
        self.category_id = Some(id.to_string());
    }
}

impl CategoryField for ExpenseDraft {
    fn set_category(&mut self, id: &str) {
        self.category_id = id.to_string();
    }
}

impl CategoryField for BudgetItemDraft {
    fn set_category(&mut self, id: &str) {
        self.category_id = id.to_string();
    }
}

impl<R> EditorDialog<R>
where
    R: Resource,
    R::Draft: CategoryField,
{
    /// Saves a nested category dialog and, on success, points this dialog's
    /// draft at the new category. The outer dialog stays open either way.
    pub fn create_category<C: Resource>(
        &mut self,
        nested: &mut EditorDialog<C>,
        categories: &mut ResourceStore<C>,
    ) -> StoreResult<Option<C>> {
        let created = nested.save(categories)?;
        if let (Some(category), Some(draft)) = (&created, self.draft_mut()) {
            draft.set_category(category.id());
        }
        Ok(created)
    }
}

impl<R> EditorDialog<R>
where
    R: Resource<Draft = CategoryDraft>,
{
    /// Click-to-select on the palette swatch at `index`.
    pub fn select_color(&mut self, palette: &ColorPalette, index: usize) -> bool {
        match (palette.select(index), self.draft_mut()) {
            (Some(hex), Some(draft)) => {
                draft.color = hex.to_string();
                true
            }
            _ => false,
        }
    }

    /// Picks the icon named by `query`, else the first search match. An
    /// empty query clears the icon.
    pub fn choose_icon(&mut self, query: &str) -> Option<IconName> {
        let draft = self.draft_mut()?;
        if query.trim().is_empty() {
            draft.icon = None;
            return None;
        }
        let icon = parse_icon(query)
            .ok()
            .or_else(|| search_icons(query).into_iter().next())?;
        draft.icon = Some(icon);
        Some(icon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{Expense, ExpenseCategory, Note, NoteCategory};
    use crate::testing::Harness;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;

    #[test]
    fn new_dialog_saves_and_closes() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let mut dialog = EditorDialog::<Note>::new();
        assert!(!dialog.is_open());

        let draft = dialog.open_new();
        draft.title = "Groceries".into();
        let saved = dialog.save(&mut notes)?;

        assert!(!dialog.is_open());
        assert_eq!(saved.map(|n| n.title), Some("Groceries".to_string()));
        assert_eq!(notes.len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_draft_keeps_dialog_open_without_remote_call() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let mut dialog = EditorDialog::<Note>::new();
        dialog.open_new().content = "body only".into();
        let calls = harness.backend.calls();

        assert_matches!(dialog.save(&mut notes), Err(StoreError::Validation(_)));
        assert!(dialog.is_open());
        assert_eq!(dialog.draft().map(|d| d.content.as_str()), Some("body only"));
        assert_eq!(harness.backend.calls(), calls);
        Ok(())
    }

    #[test]
    fn edit_dialog_updates_existing_row() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let note = notes.create(&NoteDraft {
            title: "Old".into(),
            ..NoteDraft::default()
        })?;

        let mut dialog = EditorDialog::<Note>::new();
        dialog.open_edit(&note).title = "New".into();
        assert_eq!(dialog.editing_id(), Some(note.id.as_str()));
        dialog.save(&mut notes)?;

        assert_eq!(notes.len(), 1);
        assert_eq!(notes.get(&note.id).map(|n| n.title.as_str()), Some("New"));
        Ok(())
    }

    #[test]
    fn failed_save_and_delete_stay_open() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let note = notes.create(&NoteDraft {
            title: "Keep".into(),
            ..NoteDraft::default()
        })?;
        let mut dialog = EditorDialog::<Note>::new();
        dialog.open_edit(&note);

        harness.backend.fail_next_calls(2);
        assert_matches!(dialog.save(&mut notes), Err(StoreError::Remote { .. }));
        assert_matches!(dialog.delete(&mut notes), Err(StoreError::Remote { .. }));
        assert!(dialog.is_open());

        assert!(dialog.delete(&mut notes)?);
        assert!(!dialog.is_open());
        assert!(notes.is_empty());
        Ok(())
    }

    #[test]
    fn cancel_discards_draft_and_create_has_nothing_to_delete() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut notes = harness.store::<Note>();
        let mut dialog = EditorDialog::<Note>::new();
        dialog.open_new().title = "Unsaved".into();
        assert!(!dialog.delete(&mut notes)?);
        dialog.cancel();
        assert_eq!(dialog.state(), &DialogState::Closed);
        assert_eq!(dialog.save(&mut notes)?, None);
        Ok(())
    }

    #[test]
    fn exact_icon_name_wins_over_search_order() {
        let mut dialog = EditorDialog::<ExpenseCategory>::new();
        dialog.open_new();
        assert_eq!(search_icons("car").first(), Some(&IconName::ShoppingCart));
        assert_eq!(dialog.choose_icon("Car"), Some(IconName::Car));
        assert_eq!(dialog.choose_icon("cart"), Some(IconName::ShoppingCart));
        assert_eq!(dialog.choose_icon("rocket-ship"), None);
    }

    #[test]
    fn nested_category_dialog_fills_parent_draft() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut categories = harness.store::<ExpenseCategory>();
        let mut expenses = harness.store::<Expense>();
        let mut dialog = EditorDialog::<Expense>::new();
        dialog.open_new().amount = Decimal::new(1999, 2);

        let mut nested = EditorDialog::<ExpenseCategory>::new();
        nested.open_new().name = "Travel".into();
        assert!(nested.select_color(&ColorPalette::default(), 4));
        assert_eq!(nested.choose_icon("flight"), Some(IconName::Plane));

        let category = dialog
            .create_category(&mut nested, &mut categories)?
            .map(|c| c.id)
            .unwrap_or_default();
        assert!(dialog.is_open());
        assert_eq!(dialog.draft().map(|d| d.category_id.as_str()), Some(category.as_str()));

        let expense = dialog.save(&mut expenses)?;
        assert_eq!(expense.map(|e| e.category_id), Some(category));
        assert_eq!(categories.items()[0].icon.as_deref(), Some("plane"));
        Ok(())
    }

    #[test]
    fn note_category_dialog_rejects_icons() -> anyhow::Result<()> {
        let harness = Harness::signed_in()?;
        let mut categories = harness.store::<NoteCategory>();
        let mut nested = EditorDialog::<NoteCategory>::new();
        let draft = nested.open_new();
        draft.name = "Work".into();
        draft.color = "#22c55e".into();
        nested.choose_icon("book");

        assert_matches!(nested.save(&mut categories), Err(StoreError::Validation(_)));
        nested.choose_icon("");
        assert!(nested.save(&mut categories)?.is_some());
        Ok(())
    }
}
