//! Render model of the dock: what a page would draw, with no DOM behind it.

use std::collections::BTreeMap;

use dock_proto::icon::{is_placeholder, BUILTIN_ICON, PLACEHOLDER_LINK, TRANSPARENT_PIXEL};
use dock_proto::protocol::{BookmarkEntry, SETTINGS_ITEM_ID};
use dock_proto::settings::DockSettings;
use dock_proto::title::{classify, TitleKind};
use serde::Serialize;

use crate::geometry::Rect;
use crate::menu::MenuEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Link,
    Folder,
    Settings,
}

/// Icons load lazily: `src` stays the transparent pixel until the item is
/// first shown, then `data_src` takes over.  Placeholder sentinels never load
/// and are drawn by the stylesheet instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconView {
    pub src: String,
    pub data_src: Option<String>,
    pub lazy: bool,
    pub placeholder: Option<String>,
}

impl IconView {
    pub fn new(icon_url: &str) -> Self {
        if icon_url.is_empty() || is_placeholder(icon_url) {
            let sentinel = if icon_url.is_empty() { PLACEHOLDER_LINK } else { icon_url };
            Self {
                src: TRANSPARENT_PIXEL.to_string(),
                data_src: None,
                lazy: false,
                placeholder: Some(sentinel.to_string()),
            }
        } else {
            Self {
                src: TRANSPARENT_PIXEL.to_string(),
                data_src: Some(icon_url.to_string()),
                lazy: true,
                placeholder: None,
            }
        }
    }
}

/// One row of a folder stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackEntry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub icon: IconView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DockItem {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub kind: ItemKind,
    pub icon: IconView,
    pub tooltip: Option<String>,
    pub children: Vec<StackEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderedNode {
    Spacer,
    Header { text: String, class: String },
    Item(DockItem),
}

impl RenderedNode {
    pub fn as_item(&self) -> Option<&DockItem> {
        match self {
            RenderedNode::Item(item) => Some(item),
            _ => None,
        }
    }
}

/// Turn a snapshot into dock nodes, in snapshot order.
pub fn render_snapshot(snapshot: &[BookmarkEntry], settings: &DockSettings) -> Vec<RenderedNode> {
    snapshot
        .iter()
        .map(|entry| match classify(&entry.title) {
            TitleKind::Spacer => RenderedNode::Spacer,
            TitleKind::Header(text) => RenderedNode::Header {
                text,
                class: settings.separator_style.class().to_string(),
            },
            TitleKind::Item => RenderedNode::Item(render_item(entry, settings)),
        })
        .collect()
}

fn render_item(entry: &BookmarkEntry, settings: &DockSettings) -> DockItem {
    let kind = if entry.children.is_some() {
        ItemKind::Folder
    } else if entry.id == SETTINGS_ITEM_ID {
        ItemKind::Settings
    } else {
        ItemKind::Link
    };
    let children = entry
        .children
        .iter()
        .flatten()
        .map(|child| StackEntry {
            id: child.id.clone(),
            title: child.title.clone(),
            url: child.url.clone(),
            icon: IconView::new(&child.icon_url),
        })
        .collect();
    DockItem {
        id: entry.id.clone(),
        title: entry.title.clone(),
        url: entry.url.clone(),
        kind,
        icon: IconView::new(&entry.icon_url),
        tooltip: settings.show_tooltips.then(|| entry.title.clone()),
        children,
    }
}

/// CSS custom properties and toggle classes derived from settings.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct StyleTokens {
    pub vars: BTreeMap<String, String>,
    pub classes: Vec<String>,
}

impl StyleTokens {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

pub fn style_tokens(settings: &DockSettings) -> StyleTokens {
    let mut vars = BTreeMap::new();
    vars.insert("--dock-icon-size".into(), format!("{}px", settings.dock_size));
    vars.insert("--accent-color".into(), settings.accent_color.clone());
    vars.insert("--dock-blur".into(), format!("{}px", settings.backdrop_blur));
    vars.insert("--icon-radius".into(), settings.icon_shape.clone());
    vars.insert(
        "--idle-opacity".into(),
        (settings.idle_opacity as f64 / 100.0).to_string(),
    );
    vars.insert("--line-thickness".into(), format!("{}px", settings.line_thickness));
    vars.insert("--dock-offset".into(), format!("{}%", settings.vertical_pos));

    let mut classes = vec![settings.dock_position.side_class().to_string()];
    let toggles = [
        (settings.show_tooltips, "tooltips-enabled"),
        (settings.enable_shadow, "shadow-enabled"),
        (settings.enable_accent, "theme-enabled"),
        (settings.persistent_line, "persistent-line"),
    ];
    classes.extend(
        toggles
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, class)| class.to_string()),
    );
    classes.push(settings.hover_style.class().to_string());
    classes.push(settings.separator_style.class().to_string());
    StyleTokens { vars, classes }
}

pub fn handler_icon(settings: &DockSettings) -> String {
    let custom = settings.handler_icon.trim();
    if custom.is_empty() {
        BUILTIN_ICON.to_string()
    } else {
        custom.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerView {
    pub rect: Rect,
    pub icon: String,
}

/// A rendered node at its current (possibly magnified) position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedNode {
    pub node: RenderedNode,
    pub rect: Rect,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackView {
    pub parent_id: String,
    pub rect: Rect,
    pub entries: Vec<StackEntry>,
    /// Shown instead of rows for a folder with no children.
    pub empty_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuView {
    pub target_id: String,
    pub rect: Rect,
    pub entries: Vec<MenuEntry>,
}

/// Everything a page draws for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DockView {
    pub visible: bool,
    pub idle: bool,
    pub loading: bool,
    pub style: StyleTokens,
    pub handler: HandlerView,
    pub container: Rect,
    pub nodes: Vec<PlacedNode>,
    pub stack: Option<StackView>,
    pub menu: Option<MenuView>,
}

impl DockView {
    pub fn items(&self) -> impl Iterator<Item = &DockItem> {
        self.nodes.iter().filter_map(|n| n.node.as_item())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dock_proto::icon::PLACEHOLDER_FOLDER;
    use dock_proto::settings::{DockPosition, HoverStyle};

    fn snapshot() -> Vec<BookmarkEntry> {
        let mut folder = BookmarkEntry::folder("20", "Tools");
        folder.icon_url = PLACEHOLDER_FOLDER.into();
        folder.children = Some(vec![BookmarkEntry::link("21", "Docs", "https://docs.rs/")]);
        let mut link = BookmarkEntry::link("10", "Example", "https://example.com/");
        link.icon_url = "data:image/png;base64,AAAA".into();
        vec![
            link,
            BookmarkEntry::link("11", "--- WORK ---", "https://ignored.example/"),
            folder,
            BookmarkEntry::spacer(),
            BookmarkEntry::settings_item(BUILTIN_ICON),
        ]
    }

    #[test]
    fn test_render_classifies_nodes() {
        let nodes = render_snapshot(&snapshot(), &DockSettings::default());
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].as_item().map(|i| i.kind), Some(ItemKind::Link));
        assert_eq!(
            nodes[1],
            RenderedNode::Header {
                text: "WORK".into(),
                class: "style-glass".into()
            }
        );
        let folder = nodes[2].as_item().unwrap();
        assert_eq!(folder.kind, ItemKind::Folder);
        assert_eq!(folder.children.len(), 1);
        assert_eq!(folder.icon.placeholder.as_deref(), Some(PLACEHOLDER_FOLDER));
        assert!(!folder.icon.lazy);
        assert_eq!(nodes[3], RenderedNode::Spacer);
        assert_eq!(nodes[4].as_item().map(|i| i.kind), Some(ItemKind::Settings));
    }

    #[test]
    fn test_icons_start_as_transparent_pixel() {
        let nodes = render_snapshot(&snapshot(), &DockSettings::default());
        let item = nodes[0].as_item().unwrap();
        assert!(item.icon.lazy);
        assert_eq!(item.icon.src, TRANSPARENT_PIXEL);
        assert_eq!(item.icon.data_src.as_deref(), Some("data:image/png;base64,AAAA"));

        let bare = IconView::new("");
        assert_eq!(bare.placeholder.as_deref(), Some(PLACEHOLDER_LINK));
    }

    #[test]
    fn test_tooltips_follow_setting() {
        let settings = DockSettings {
            show_tooltips: false,
            ..DockSettings::default()
        };
        let nodes = render_snapshot(&snapshot(), &settings);
        assert_eq!(nodes[0].as_item().unwrap().tooltip, None);

        let settings = DockSettings {
            show_tooltips: true,
            ..DockSettings::default()
        };
        let nodes = render_snapshot(&snapshot(), &settings);
        assert_eq!(nodes[0].as_item().unwrap().tooltip.as_deref(), Some("Example"));
    }

    #[test]
    fn test_style_tokens() {
        let settings = DockSettings {
            dock_position: DockPosition::Bottom,
            idle_opacity: 40,
            enable_shadow: true,
            enable_accent: false,
            hover_style: HoverStyle::Line,
            ..DockSettings::default()
        };
        let tokens = style_tokens(&settings);
        assert_eq!(tokens.vars["--idle-opacity"], "0.4");
        assert_eq!(tokens.vars["--dock-icon-size"], "48px");
        assert!(tokens.has_class("bottom-side"));
        assert!(tokens.has_class("shadow-enabled"));
        assert!(!tokens.has_class("theme-enabled"));
        assert!(tokens.has_class("hover-line"));
    }

    #[test]
    fn test_handler_icon_falls_back_to_builtin() {
        let mut settings = DockSettings::default();
        settings.handler_icon = "   ".into();
        assert_eq!(handler_icon(&settings), BUILTIN_ICON);
        settings.handler_icon = "https://example.com/h.png".into();
        assert_eq!(handler_icon(&settings), "https://example.com/h.png");
    }
}
