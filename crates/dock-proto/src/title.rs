//! Display conventions layered on plain bookmark titles.
//!
//! - `-` exactly: a spacer.
//! - `--- TEXT ---` (trimmed, longer than six characters): a section header
//!   showing `TEXT`.
//! - anything else: a regular item.

use crate::protocol::SPACER_TITLE;

const HEADER_DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleKind {
    Spacer,
    Header(String),
    Item,
}

impl TitleKind {
    /// Spacers and headers are never clickable.
    pub fn is_interactive(&self) -> bool {
        matches!(self, TitleKind::Item)
    }
}

pub fn classify(title: &str) -> TitleKind {
    if title == SPACER_TITLE {
        return TitleKind::Spacer;
    }
    let clean = title.trim();
    if clean.len() > 6 && clean.starts_with(HEADER_DELIMITER) && clean.ends_with(HEADER_DELIMITER) {
        return TitleKind::Header(clean.replace(HEADER_DELIMITER, "").trim().to_string());
    }
    TitleKind::Item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_text_is_stripped() {
        assert_eq!(classify("--- WORK ---"), TitleKind::Header("WORK".into()));
        assert_eq!(classify("  ---News---  "), TitleKind::Header("News".into()));
    }

    #[test]
    fn test_spacer_is_exact() {
        assert_eq!(classify("-"), TitleKind::Spacer);
        assert_eq!(classify(" - "), TitleKind::Item);
    }

    #[test]
    fn test_short_or_open_dashes_are_items() {
        assert_eq!(classify("------"), TitleKind::Item);
        assert_eq!(classify("--- open"), TitleKind::Item);
        assert_eq!(classify(""), TitleKind::Item);
        assert_eq!(classify("Example"), TitleKind::Item);
    }

    #[test]
    fn test_interactivity() {
        assert!(!classify("-").is_interactive());
        assert!(!classify("--- WORK ---").is_interactive());
        assert!(classify("Example").is_interactive());
    }
}
