//! The `echarts` namespace handed to scripts.
//!
//! Library-wide utilities with no mutable state: the default palette, built-in
//! themes, the library version and a color helper.

use serde_json::{json, Value};

use crate::raster::parse_color;

/// Default series palette, cycled by series index.
pub const DEFAULT_PALETTE: [&str; 9] = [
    "#5470c6", "#91cc75", "#fac858", "#ee6666", "#73c0de", "#3ba272", "#fc8452", "#9a60b4",
    "#ea7ccc",
];

const DARK_PALETTE: [&str; 9] = [
    "#4992ff", "#7cffb2", "#fddd60", "#ff6e76", "#58d9f9", "#05c091", "#ff8a45", "#8d48e3",
    "#dd79ff",
];

const THEME_NAMES: [&str; 2] = ["light", "dark"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartsNamespace;

impl ChartsNamespace {
    pub fn palette(&self) -> &'static [&'static str] {
        &DEFAULT_PALETTE
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn theme_names(&self) -> &'static [&'static str] {
        &THEME_NAMES
    }

    /// Built-in theme as an option fragment, or `None` for unknown names.
    pub fn theme(&self, name: &str) -> Option<Value> {
        match name {
            "light" => Some(json!({
                "color": DEFAULT_PALETTE,
                "backgroundColor": "transparent",
                "textStyle": { "color": "#333" }
            })),
            "dark" => Some(json!({
                "color": DARK_PALETTE,
                "backgroundColor": "#100c2a",
                "textStyle": { "color": "#eee" }
            })),
            _ => None,
        }
    }

    /// Lighten `color` towards white. `level` is clamped to 0..=1.
    pub fn lift(&self, color: &str, level: f64) -> Result<String, String> {
        let rgba = parse_color(color).ok_or_else(|| format!("invalid color: {}", color))?;
        let level = level.clamp(0.0, 1.0);
        let channel = |c: u8| (c as f64 + (255.0 - c as f64) * level).round() as u8;
        Ok(format!(
            "#{:02x}{:02x}{:02x}",
            channel(rgba[0]),
            channel(rgba[1]),
            channel(rgba[2])
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_is_valid_colors() {
        let ns = ChartsNamespace;
        assert!(ns.palette().iter().all(|c| parse_color(c).is_some()));
        assert_eq!(ns.palette()[0], "#5470c6");
    }

    #[test]
    fn test_themes() {
        let ns = ChartsNamespace;
        for name in ns.theme_names() {
            assert!(ns.theme(name).is_some());
        }
        assert!(ns.theme("solarized").is_none());
        assert_eq!(ns.theme("dark").unwrap()["backgroundColor"], "#100c2a");
    }

    #[test]
    fn test_lift() {
        let ns = ChartsNamespace;
        assert_eq!(ns.lift("#000000", 0.5).unwrap(), "#808080");
        assert_eq!(ns.lift("#5470c6", 0.0).unwrap(), "#5470c6");
        assert_eq!(ns.lift("#123", 2.0).unwrap(), "#ffffff");
        assert!(ns.lift("bogus", 0.1).is_err());
    }
}
