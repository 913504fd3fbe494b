//! Tag palette
//!
//! Tags are free-form strings attached to records. The palette only maps a
//! tag name to the color used when displaying it; a tag with no palette entry
//! is still valid on a record.

use serde::{Deserialize, Serialize};

/// 8-bit RGB display color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl TagColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb` form for UIs
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Named tag with its display color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDef {
    pub name: String,
    pub color: TagColor,
}

/// Ordered set of known tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPalette {
    tags: Vec<TagDef>,
}

impl TagPalette {
    /// Palette with no tags at all
    pub fn empty() -> Self {
        Self { tags: Vec::new() }
    }

    /// Color for `name`, if the palette knows it
    pub fn color_of(&self, name: &str) -> Option<TagColor> {
        self.tags.iter().find(|t| t.name == name).map(|t| t.color)
    }

    /// Insert a tag or recolor an existing one
    pub fn define(&mut self, name: &str, color: TagColor) {
        match self.tags.iter_mut().find(|t| t.name == name) {
            Some(existing) => existing.color = color,
            None => self.tags.push(TagDef {
                name: name.to_string(),
                color,
            }),
        }
    }

    /// Remove a tag definition; returns false if unknown
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.name != name);
        self.tags.len() != before
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagDef> {
        self.tags.iter()
    }
}

impl Default for TagPalette {
    fn default() -> Self {
        let mut palette = Self::empty();
        palette.define("OnHold", TagColor::new(140, 140, 140));
        palette.define("MacBug", TagColor::new(140, 140, 140));
        palette.define("NeedInfo", TagColor::new(140, 140, 223));
        palette
    }
}
