use once_cell::sync::Lazy;
use regex::Regex;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid hex color pattern"));

/// Swatches offered by the category dialogs, in display order.
pub const PALETTE: [(&str, &str); 12] = [
    ("red", "#ef4444"),
    ("orange", "#f97316"),
    ("amber", "#f59e0b"),
    ("green", "#22c55e"),
    ("teal", "#14b8a6"),
    ("cyan", "#06b6d4"),
    ("blue", "#3b82f6"),
    ("indigo", "#6366f1"),
    ("violet", "#8b5cf6"),
    ("pink", "#ec4899"),
    ("slate", "#64748b"),
    ("stone", "#78716c"),
];

pub const DEFAULT_COLOR: &str = "#3b82f6";

pub fn is_hex_color(raw: &str) -> bool {
    HEX_COLOR.is_match(raw)
}

#[derive(Debug, Clone)]
pub struct ColorPalette {
    swatches: Vec<(&'static str, &'static str)>,
}

impl ColorPalette {
    /// Click-to-select: the swatch at `index`, if any.
    pub fn select(&self, index: usize) -> Option<&'static str> {
        self.swatches.get(index).map(|(_, hex)| *hex)
    }

    pub fn contains(&self, hex: &str) -> bool {
        self.swatches
            .iter()
            .any(|(_, known)| known.eq_ignore_ascii_case(hex))
    }

    /// Accepts a swatch name (`teal`) or any `#RRGGBB` value, returning the
    /// lower-cased hex string.
    pub fn resolve(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();
        if let Some((_, hex)) = self
            .swatches
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
        {
            return Some((*hex).to_string());
        }
        is_hex_color(trimmed).then(|| trimmed.to_lowercase())
    }

    pub fn all(&self) -> impl Iterator<Item = &(&'static str, &'static str)> {
        self.swatches.iter()
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            swatches: PALETTE.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_hex_values() {
        let palette = ColorPalette::default();
        assert_eq!(palette.resolve("Teal").as_deref(), Some("#14b8a6"));
        assert_eq!(palette.resolve("#ABCDEF").as_deref(), Some("#abcdef"));
        assert_eq!(palette.resolve("chartreuse"), None);
        assert_eq!(palette.resolve("#abc"), None);
    }

    #[test]
    fn select_by_index_stays_in_palette() {
        let palette = ColorPalette::default();
        assert_eq!(palette.select(0), Some("#ef4444"));
        assert!(palette.select(PALETTE.len()).is_none());
        assert!(palette.contains(DEFAULT_COLOR));
    }
}
