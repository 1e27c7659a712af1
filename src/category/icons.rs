use std::str::FromStr;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ValidationError;

/// Closed set of icons an expense category may carry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum IconName {
    ShoppingCart,
    Utensils,
    Coffee,
    Car,
    Fuel,
    Bus,
    Plane,
    Home,
    Zap,
    Wifi,
    Phone,
    Heart,
    Stethoscope,
    Dumbbell,
    GraduationCap,
    Book,
    Film,
    Music,
    Gift,
    Shirt,
    Briefcase,
    CreditCard,
    PiggyBank,
    Tag,
}

impl IconName {
    /// Terminal rendering of the icon.
    pub fn glyph(self) -> &'static str {
        match self {
            IconName::ShoppingCart => "🛒",
            IconName::Utensils => "🍴",
            IconName::Coffee => "☕",
            IconName::Car => "🚗",
            IconName::Fuel => "⛽",
            IconName::Bus => "🚌",
            IconName::Plane => "✈",
            IconName::Home => "🏠",
            IconName::Zap => "⚡",
            IconName::Wifi => "📶",
            IconName::Phone => "📱",
            IconName::Heart => "❤",
            IconName::Stethoscope => "🩺",
            IconName::Dumbbell => "🏋",
            IconName::GraduationCap => "🎓",
            IconName::Book => "📚",
            IconName::Film => "🎬",
            IconName::Music => "🎵",
            IconName::Gift => "🎁",
            IconName::Shirt => "👕",
            IconName::Briefcase => "💼",
            IconName::CreditCard => "💳",
            IconName::PiggyBank => "🐷",
            IconName::Tag => "🏷",
        }
    }

    /// Extra words the picker matches besides the icon name itself.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            IconName::ShoppingCart => &["groceries", "shopping"],
            IconName::Utensils => &["food", "restaurant", "dining"],
            IconName::Coffee => &["cafe", "drinks"],
            IconName::Car => &["auto", "transport"],
            IconName::Fuel => &["gas", "petrol"],
            IconName::Bus => &["transit", "transport"],
            IconName::Plane => &["travel", "flight"],
            IconName::Home => &["rent", "mortgage", "housing"],
            IconName::Zap => &["electricity", "utilities"],
            IconName::Wifi => &["internet"],
            IconName::Phone => &["mobile"],
            IconName::Heart => &["health", "charity"],
            IconName::Stethoscope => &["doctor", "medical"],
            IconName::Dumbbell => &["gym", "fitness"],
            IconName::GraduationCap => &["education", "school"],
            IconName::Book => &["books", "reading"],
            IconName::Film => &["movies", "entertainment"],
            IconName::Music => &["concerts", "streaming"],
            IconName::Gift => &["presents"],
            IconName::Shirt => &["clothing", "apparel"],
            IconName::Briefcase => &["work", "business"],
            IconName::CreditCard => &["fees", "payments"],
            IconName::PiggyBank => &["savings"],
            IconName::Tag => &["misc", "other"],
        }
    }
}

/// Parses a user-supplied icon identifier into the closed set.
pub fn parse_icon(raw: &str) -> Result<IconName, ValidationError> {
    IconName::from_str(raw.trim()).map_err(|_| {
        ValidationError::new("icon", format!("unknown icon '{}'", raw.trim()))
    })
}

/// Searchable lookup for the icon picker; an empty query lists every icon.
pub fn search_icons(query: &str) -> Vec<IconName> {
    let needle = query.trim().to_lowercase();
    IconName::iter()
        .filter(|icon| {
            needle.is_empty()
                || icon.as_ref().contains(&needle)
                || icon.keywords().iter().any(|word| word.contains(&needle))
        })
        .collect()
}
