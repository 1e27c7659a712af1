use indexmap::IndexMap;

use crate::models::{ExpenseCategory, NoteCategory};

mod icons;
mod palette;

pub use icons::{parse_icon, search_icons, IconName};
pub use palette::{is_hex_color, ColorPalette, DEFAULT_COLOR, PALETTE};

/// Label for entities that reference no category at all.
pub const UNCATEGORIZED_LABEL: &str = "General";
/// Label for expense rows whose category was deleted or never synced.
pub const UNKNOWN_CATEGORY_LABEL: &str = "Unknown Category";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    pub name: String,
    pub color: String,
    pub icon: Option<IconName>,
}

/// Category a row resolved to for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Known(&'a CategoryEntry),
    Uncategorized,
    Stale,
}

/// Lookup from soft category ids to display data. References are never
/// enforced; anything the index cannot resolve falls back to a fixed label.
#[derive(Debug, Clone)]
pub struct CategoryIndex {
    entries: IndexMap<String, CategoryEntry>,
    stale_label: &'static str,
}

impl CategoryIndex {
    pub fn new(stale_label: &'static str) -> Self {
        Self {
            entries: IndexMap::new(),
            stale_label,
        }
    }

    pub fn for_expenses(categories: &[ExpenseCategory]) -> Self {
        let mut index = Self::new(UNKNOWN_CATEGORY_LABEL);
        for category in categories {
            index.insert(
                &category.id,
                CategoryEntry {
                    name: category.name.clone(),
                    color: category.color.clone(),
                    icon: category.icon(),
                },
            );
        }
        index
    }

    pub fn for_notes(categories: &[NoteCategory]) -> Self {
        let mut index = Self::new(UNCATEGORIZED_LABEL);
        for category in categories {
            index.insert(
                &category.id,
                CategoryEntry {
                    name: category.name.clone(),
                    color: category.color.clone(),
                    icon: None,
                },
            );
        }
        index
    }

    pub fn insert(&mut self, id: &str, entry: CategoryEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, reference: Option<&str>) -> Resolved<'_> {
        match reference.map(str::trim).filter(|id| !id.is_empty()) {
            None => Resolved::Uncategorized,
            Some(id) => self
                .entries
                .get(id)
                .map_or(Resolved::Stale, Resolved::Known),
        }
    }

    pub fn label(&self, reference: Option<&str>) -> &str {
        match self.resolve(reference) {
            Resolved::Known(entry) => &entry.name,
            Resolved::Uncategorized => UNCATEGORIZED_LABEL,
            Resolved::Stale => self.stale_label,
        }
    }

    pub fn color(&self, reference: Option<&str>) -> &str {
        match self.resolve(reference) {
            Resolved::Known(entry) => &entry.color,
            _ => DEFAULT_COLOR,
        }
    }

    /// Finds a category id by case-insensitive name, for command-line input
    /// that names a category instead of passing its id.
    pub fn find_by_name(&self, name: &str) -> Option<&str> {
        let needle = name.trim();
        self.entries
            .iter()
            .find(|(_, entry)| entry.name.eq_ignore_ascii_case(needle))
            .map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryEntry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }
}
