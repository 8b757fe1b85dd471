//! Context menu entries for dock items.

use serde::{Deserialize, Serialize};

use crate::view::{DockItem, ItemKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    AddCurrentPage,
    OpenSettings,
    OpenInNewWindow,
    OpenInIncognito,
    EditName,
    ChangeIcon,
    Remove,
    ToggleSettingsIcon,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuEntry {
    pub action: MenuAction,
    pub label: String,
    pub separator_before: bool,
    pub destructive: bool,
}

impl MenuEntry {
    fn new(action: MenuAction, label: &str) -> Self {
        Self {
            action,
            label: label.to_string(),
            separator_before: false,
            destructive: false,
        }
    }

    fn after_separator(mut self) -> Self {
        self.separator_before = true;
        self
    }
}

pub const RENAME_PROMPT: &str = "Enter new name:";
pub const ICON_PROMPT: &str = "Enter new image URL (leave empty to reset):";

pub fn delete_confirmation(title: &str) -> String {
    format!("Delete \"{}\" from your bookmarks?", title)
}

/// Entries for the menu opened on `item`.  The settings item only offers
/// dock-level actions; folders have no URL to open elsewhere.
pub fn build_menu(item: &DockItem, show_settings: bool) -> Vec<MenuEntry> {
    let mut entries = vec![MenuEntry::new(MenuAction::AddCurrentPage, "Add Current Page to Dock")];

    match item.kind {
        ItemKind::Settings => {
            entries.push(MenuEntry::new(MenuAction::OpenSettings, "Open Settings").after_separator());
        }
        kind => {
            if kind == ItemKind::Link && item.url.as_deref().is_some_and(|u| !u.is_empty()) {
                entries.push(
                    MenuEntry::new(MenuAction::OpenInNewWindow, "Open in New Window").after_separator(),
                );
                entries.push(MenuEntry::new(MenuAction::OpenInIncognito, "Open in Incognito"));
            }
            entries.push(MenuEntry::new(MenuAction::EditName, "Edit Name").after_separator());
            entries.push(MenuEntry::new(MenuAction::ChangeIcon, "Change Icon URL"));
            let mut remove = MenuEntry::new(MenuAction::Remove, "Remove from Dock").after_separator();
            remove.destructive = true;
            entries.push(remove);
        }
    }

    let toggle = if show_settings {
        "Hide Settings Icon"
    } else {
        "Show Settings Icon"
    };
    entries.push(MenuEntry::new(MenuAction::ToggleSettingsIcon, toggle).after_separator());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::IconView;

    fn item(kind: ItemKind, url: Option<&str>) -> DockItem {
        DockItem {
            id: "10".into(),
            title: "Example".into(),
            url: url.map(String::from),
            kind,
            icon: IconView::new(""),
            tooltip: None,
            children: Vec::new(),
        }
    }

    fn actions(entries: &[MenuEntry]) -> Vec<MenuAction> {
        entries.iter().map(|e| e.action).collect()
    }

    #[test]
    fn test_link_menu() {
        let entries = build_menu(&item(ItemKind::Link, Some("https://example.com/")), true);
        assert_eq!(
            actions(&entries),
            vec![
                MenuAction::AddCurrentPage,
                MenuAction::OpenInNewWindow,
                MenuAction::OpenInIncognito,
                MenuAction::EditName,
                MenuAction::ChangeIcon,
                MenuAction::Remove,
                MenuAction::ToggleSettingsIcon,
            ]
        );
        assert_eq!(entries[4].label, "Change Icon URL");
        assert_eq!(entries[5].label, "Remove from Dock");
        assert!(entries[5].destructive);
        assert_eq!(entries[6].label, "Hide Settings Icon");
    }

    #[test]
    fn test_settings_item_menu() {
        let entries = build_menu(&item(ItemKind::Settings, Some("")), false);
        assert_eq!(
            actions(&entries),
            vec![
                MenuAction::AddCurrentPage,
                MenuAction::OpenSettings,
                MenuAction::ToggleSettingsIcon,
            ]
        );
        assert_eq!(entries[2].label, "Show Settings Icon");
    }

    #[test]
    fn test_folder_menu_has_no_open_entries() {
        let entries = build_menu(&item(ItemKind::Folder, None), true);
        assert!(!actions(&entries).contains(&MenuAction::OpenInNewWindow));
        assert!(actions(&entries).contains(&MenuAction::Remove));
    }
}
