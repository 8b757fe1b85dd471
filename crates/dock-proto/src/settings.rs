//! Dock preferences as stored in the key-value store.
//!
//! Every field lives under its own key (camelCase, e.g. `dockPosition`).  Values
//! are read leniently: a missing or malformed value falls back to the default
//! for that field only, so a half-written store still yields a usable record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_DOCK_POSITION: &str = "dockPosition";
pub const KEY_DOCK_SIZE: &str = "dockSize";
pub const KEY_EDGE_TRIGGER: &str = "edgeTrigger";
pub const KEY_HANDLER_ICON: &str = "handlerIcon";
pub const KEY_ACCENT_COLOR: &str = "accentColor";
pub const KEY_SHOW_TOOLTIPS: &str = "showTooltips";
pub const KEY_SEPARATOR_STYLE: &str = "separatorStyle";
pub const KEY_ENABLE_SHADOW: &str = "enableShadow";
pub const KEY_HOVER_STYLE: &str = "hoverStyle";
pub const KEY_ENABLE_ACCENT: &str = "enableAccent";
pub const KEY_SHOW_SETTINGS: &str = "showSettings";
pub const KEY_BACKDROP_BLUR: &str = "backdropBlur";
pub const KEY_ICON_SHAPE: &str = "iconShape";
pub const KEY_IDLE_OPACITY: &str = "idleOpacity";
pub const KEY_VERTICAL_POS: &str = "verticalPos";
pub const KEY_LINE_THICKNESS: &str = "lineThickness";
pub const KEY_PERSISTENT_LINE: &str = "persistentLine";
pub const KEY_SETTINGS_ICON: &str = "settingsIcon";

/// Per-id custom icon overrides.
pub const KEY_CUSTOM_ICONS: &str = "customIcons";
/// Per-id fetched favicon payloads.  Deliberately absent from every
/// allow-list below: a cache fill must never trigger a rebuild.
pub const KEY_FAVICON_CACHE: &str = "faviconCache";

/// All keys that make up a [`DockSettings`] record.
pub const SETTINGS_KEYS: &[&str] = &[
    KEY_DOCK_POSITION,
    KEY_DOCK_SIZE,
    KEY_EDGE_TRIGGER,
    KEY_HANDLER_ICON,
    KEY_ACCENT_COLOR,
    KEY_SHOW_TOOLTIPS,
    KEY_SEPARATOR_STYLE,
    KEY_ENABLE_SHADOW,
    KEY_HOVER_STYLE,
    KEY_ENABLE_ACCENT,
    KEY_SHOW_SETTINGS,
    KEY_BACKDROP_BLUR,
    KEY_ICON_SHAPE,
    KEY_IDLE_OPACITY,
    KEY_VERTICAL_POS,
    KEY_LINE_THICKNESS,
    KEY_PERSISTENT_LINE,
    KEY_SETTINGS_ICON,
];

/// Keys whose change alters how an already-rendered dock looks or sits.
pub const VISUAL_KEYS: &[&str] = &[
    KEY_DOCK_POSITION,
    KEY_DOCK_SIZE,
    KEY_EDGE_TRIGGER,
    KEY_VERTICAL_POS,
    KEY_HANDLER_ICON,
    KEY_ACCENT_COLOR,
    KEY_SHOW_TOOLTIPS,
    KEY_SEPARATOR_STYLE,
    KEY_ENABLE_SHADOW,
    KEY_HOVER_STYLE,
    KEY_ENABLE_ACCENT,
    KEY_BACKDROP_BLUR,
    KEY_ICON_SHAPE,
    KEY_IDLE_OPACITY,
    KEY_LINE_THICKNESS,
    KEY_PERSISTENT_LINE,
];

/// Keys whose change alters the snapshot contents.
pub const SNAPSHOT_KEYS: &[&str] = &[KEY_CUSTOM_ICONS, KEY_SHOW_SETTINGS, KEY_SETTINGS_ICON];

pub fn is_visual_key(key: &str) -> bool {
    VISUAL_KEYS.contains(&key)
}

/// The allow-list the background reacts to.  Anything else is ignored.
pub fn is_relevant_key(key: &str) -> bool {
    is_visual_key(key) || SNAPSHOT_KEYS.contains(&key)
}

pub fn is_settings_key(key: &str) -> bool {
    SETTINGS_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DockPosition {
    #[default]
    Left,
    Right,
    Top,
    Bottom,
}

impl DockPosition {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    /// Left/right docks lay items out top to bottom.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }

    pub fn side_class(self) -> &'static str {
        match self {
            Self::Left => "left-side",
            Self::Right => "right-side",
            Self::Top => "top-side",
            Self::Bottom => "bottom-side",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HoverStyle {
    #[default]
    Glow,
    Line,
    None,
}

impl HoverStyle {
    /// Unknown values render as `None`, not as the default.
    pub fn parse(s: &str) -> Self {
        match s {
            "glow" => Self::Glow,
            "line" => Self::Line,
            _ => Self::None,
        }
    }

    pub fn class(self) -> &'static str {
        match self {
            Self::Glow => "hover-glow",
            Self::Line => "hover-line",
            Self::None => "hover-none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeparatorStyle {
    #[default]
    Glass,
    Neon,
    Minimal,
    Classic,
}

impl SeparatorStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "glass" => Some(Self::Glass),
            "neon" => Some(Self::Neon),
            "minimal" => Some(Self::Minimal),
            "classic" => Some(Self::Classic),
            _ => None,
        }
    }

    pub fn class(self) -> &'static str {
        match self {
            Self::Glass => "style-glass",
            Self::Neon => "style-neon",
            Self::Minimal => "style-minimal",
            Self::Classic => "style-classic",
        }
    }
}

/// Immutable snapshot of the user's dock preferences.  Pages never mutate it;
/// a new one replaces it wholesale on every relevant change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DockSettings {
    pub dock_position: DockPosition,
    /// Icon edge length in pixels at rest.
    pub dock_size: u32,
    pub edge_trigger: bool,
    /// Empty means the builtin handler icon.
    pub handler_icon: String,
    pub accent_color: String,
    pub show_tooltips: bool,
    pub separator_style: SeparatorStyle,
    pub enable_shadow: bool,
    pub hover_style: HoverStyle,
    pub enable_accent: bool,
    pub show_settings: bool,
    pub backdrop_blur: u32,
    /// CSS border radius, e.g. `12px` or `50%`.
    pub icon_shape: String,
    /// 0..=100
    pub idle_opacity: u32,
    /// Anchor position along the dock axis, percent of the viewport.
    pub vertical_pos: f64,
    pub line_thickness: u32,
    pub persistent_line: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_icon: Option<String>,
}

impl Default for DockSettings {
    fn default() -> Self {
        Self {
            dock_position: DockPosition::Left,
            dock_size: 48,
            edge_trigger: false,
            handler_icon: String::new(),
            accent_color: "#007aff".to_string(),
            show_tooltips: true,
            separator_style: SeparatorStyle::Glass,
            enable_shadow: true,
            hover_style: HoverStyle::Glow,
            enable_accent: true,
            show_settings: true,
            backdrop_blur: 10,
            icon_shape: "12px".to_string(),
            idle_opacity: 100,
            vertical_pos: 50.0,
            line_thickness: 3,
            persistent_line: false,
            settings_icon: None,
        }
    }
}

impl DockSettings {
    /// Build a record from raw store values, field by field.
    ///
    /// Truthiness follows the stored-preference conventions: opt-in flags
    /// (`edgeTrigger`, `persistentLine`) are on only for a literal `true`,
    /// opt-out flags are on unless literally `false`, and zero-valued numbers
    /// for size, position and thickness mean "unset".
    pub fn from_values(values: &Map<String, Value>) -> Self {
        let d = Self::default();
        let get = |key: &str| values.get(key).filter(|v| !v.is_null());

        Self {
            dock_position: get(KEY_DOCK_POSITION)
                .and_then(Value::as_str)
                .and_then(DockPosition::parse)
                .unwrap_or(d.dock_position),
            dock_size: get(KEY_DOCK_SIZE)
                .and_then(lenient_number)
                .filter(|n| *n >= 1.0)
                .map(|n| n as u32)
                .unwrap_or(d.dock_size),
            edge_trigger: get(KEY_EDGE_TRIGGER) == Some(&Value::Bool(true)),
            handler_icon: get(KEY_HANDLER_ICON)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(d.handler_icon),
            accent_color: non_empty_str(get(KEY_ACCENT_COLOR)).unwrap_or(d.accent_color),
            show_tooltips: get(KEY_SHOW_TOOLTIPS) != Some(&Value::Bool(false)),
            separator_style: get(KEY_SEPARATOR_STYLE)
                .and_then(Value::as_str)
                .and_then(SeparatorStyle::parse)
                .unwrap_or(d.separator_style),
            enable_shadow: get(KEY_ENABLE_SHADOW) != Some(&Value::Bool(false)),
            hover_style: get(KEY_HOVER_STYLE)
                .and_then(Value::as_str)
                .map(HoverStyle::parse)
                .unwrap_or(d.hover_style),
            enable_accent: get(KEY_ENABLE_ACCENT) != Some(&Value::Bool(false)),
            show_settings: get(KEY_SHOW_SETTINGS) != Some(&Value::Bool(false)),
            backdrop_blur: get(KEY_BACKDROP_BLUR)
                .and_then(lenient_number)
                .filter(|n| *n >= 0.0)
                .map(|n| n as u32)
                .unwrap_or(d.backdrop_blur),
            icon_shape: non_empty_str(get(KEY_ICON_SHAPE)).unwrap_or(d.icon_shape),
            idle_opacity: get(KEY_IDLE_OPACITY)
                .and_then(lenient_number)
                .map(|n| n.clamp(0.0, 100.0) as u32)
                .unwrap_or(d.idle_opacity),
            vertical_pos: get(KEY_VERTICAL_POS)
                .and_then(lenient_number)
                .filter(|n| *n > 0.0)
                .map(|n| n.min(100.0))
                .unwrap_or(d.vertical_pos),
            line_thickness: get(KEY_LINE_THICKNESS)
                .and_then(lenient_number)
                .filter(|n| *n >= 1.0)
                .map(|n| n as u32)
                .unwrap_or(d.line_thickness),
            persistent_line: get(KEY_PERSISTENT_LINE) == Some(&Value::Bool(true)),
            settings_icon: non_empty_str(get(KEY_SETTINGS_ICON)),
        }
    }

    /// True when switching from `self` to `next` moves or resizes the dock,
    /// which invalidates any anchored overlay.
    pub fn layout_changed(&self, next: &DockSettings) -> bool {
        self.dock_position != next.dock_position
            || self.dock_size != next.dock_size
            || self.vertical_pos != next.vertical_pos
    }
}

/// Accept numbers and numeric strings (`"48"`, `"48px"`), like a form field
/// round-tripped through storage would produce.
fn lenient_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_from_empty_store() {
        let s = DockSettings::from_values(&Map::new());
        assert_eq!(s, DockSettings::default());
        assert_eq!(s.dock_size, 48);
        assert_eq!(s.accent_color, "#007aff");
        assert!(s.show_settings);
        assert!(!s.edge_trigger);
    }

    #[test]
    fn test_lenient_parsing() {
        let s = DockSettings::from_values(&values(json!({
            "dockPosition": "bottom",
            "dockSize": "64",
            "edgeTrigger": "yes",
            "showTooltips": 0,
            "showSettings": false,
            "hoverStyle": "sparkle",
            "separatorStyle": "neon",
            "verticalPos": 0,
            "idleOpacity": 250,
            "lineThickness": null,
        })));
        assert_eq!(s.dock_position, DockPosition::Bottom);
        assert_eq!(s.dock_size, 64);
        assert!(!s.edge_trigger);
        assert!(s.show_tooltips);
        assert!(!s.show_settings);
        assert_eq!(s.hover_style, HoverStyle::None);
        assert_eq!(s.separator_style, SeparatorStyle::Neon);
        assert_eq!(s.vertical_pos, 50.0);
        assert_eq!(s.idle_opacity, 100);
        assert_eq!(s.line_thickness, 3);
    }

    #[test]
    fn test_garbage_values_fall_back_per_field() {
        let s = DockSettings::from_values(&values(json!({
            "dockPosition": "diagonal",
            "dockSize": "huge",
            "accentColor": "",
            "backdropBlur": 0,
        })));
        assert_eq!(s.dock_position, DockPosition::Left);
        assert_eq!(s.dock_size, 48);
        assert_eq!(s.accent_color, "#007aff");
        assert_eq!(s.backdrop_blur, 0);
    }

    #[test]
    fn test_allow_list() {
        assert!(is_relevant_key(KEY_DOCK_POSITION));
        assert!(is_relevant_key(KEY_CUSTOM_ICONS));
        assert!(is_relevant_key(KEY_SHOW_SETTINGS));
        assert!(!is_relevant_key(KEY_FAVICON_CACHE));
        assert!(!is_relevant_key("somethingElse"));
        assert!(!is_visual_key(KEY_SHOW_SETTINGS));
        assert!(is_settings_key(KEY_SHOW_SETTINGS));
        assert!(!is_settings_key(KEY_CUSTOM_ICONS));
    }

    #[test]
    fn test_layout_changed() {
        let a = DockSettings::default();
        let mut b = a.clone();
        b.accent_color = "#ff0000".into();
        assert!(!a.layout_changed(&b));
        b.dock_position = DockPosition::Right;
        assert!(a.layout_changed(&b));
    }

    #[test]
    fn test_serde_uses_store_key_names() {
        let json = serde_json::to_value(DockSettings::default()).unwrap();
        assert_eq!(json[KEY_DOCK_POSITION], "left");
        assert_eq!(json[KEY_VERTICAL_POS], 50.0);
        assert!(json.get(KEY_SETTINGS_ICON).is_none());
    }
}
