use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{
    require_text, InsertPosition, Labelled, Resource, SortDirection, SortField, SortKey,
    SortSpec, Table,
};
use crate::category::{is_hex_color, IconName};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    /// Raw icon identifier as stored remotely; see [`ExpenseCategory::icon`].
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteCategory {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Shared draft for both category tables. Note categories carry no icon, so
/// the field is left out of the payload when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconName>,
}

impl ExpenseCategory {
    /// Icons written by other clients may be outside the known set; those
    /// render as if no icon was chosen.
    pub fn icon(&self) -> Option<IconName> {
        self.icon.as_deref().and_then(|raw| raw.parse().ok())
    }
}

fn validate_category(draft: &CategoryDraft) -> Result<(), ValidationError> {
    require_text("name", &draft.name)?;
    if !is_hex_color(&draft.color) {
        return Err(ValidationError::new(
            "color",
            format!("'{}' is not a #RRGGBB color", draft.color),
        ));
    }
    Ok(())
}

impl Resource for ExpenseCategory {
    type Draft = CategoryDraft;

    const TABLE: Table = Table::ExpenseCategories;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Title, SortDirection::Ascending);
    const INSERT_POSITION: InsertPosition = InsertPosition::Append;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> CategoryDraft {
        CategoryDraft {
            name: self.name.clone(),
            color: self.color.clone(),
            icon: self.icon(),
        }
    }

    fn validate(draft: &CategoryDraft) -> Result<(), ValidationError> {
        validate_category(draft)
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![&self.name]
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Created => "created_at",
            _ => "name",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Created => SortKey::Timestamp(self.created_at),
            _ => SortKey::text(&self.name),
        }
    }
}

impl Resource for NoteCategory {
    type Draft = CategoryDraft;

    const TABLE: Table = Table::NoteCategories;
    const DEFAULT_ORDER: SortSpec = SortSpec::new(SortField::Title, SortDirection::Ascending);
    const INSERT_POSITION: InsertPosition = InsertPosition::Append;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn to_draft(&self) -> CategoryDraft {
        CategoryDraft {
            name: self.name.clone(),
            color: self.color.clone(),
            icon: None,
        }
    }

    fn validate(draft: &CategoryDraft) -> Result<(), ValidationError> {
        validate_category(draft)?;
        if draft.icon.is_some() {
            return Err(ValidationError::new(
                "icon",
                "note categories do not support icons",
            ));
        }
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![&self.name]
    }

    fn order_column(field: SortField) -> &'static str {
        match field {
            SortField::Created => "created_at",
            _ => "name",
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Created => SortKey::Timestamp(self.created_at),
            _ => SortKey::text(&self.name),
        }
    }
}

impl Labelled for ExpenseCategory {
    fn label(&self) -> String {
        match self.icon() {
            Some(icon) => format!("{} {}", icon.glyph(), self.name),
            None => self.name.clone(),
        }
    }
}

impl Labelled for NoteCategory {
    fn label(&self) -> String {
        self.name.clone()
    }
}
