//! Platform-agnostic key names.
//!
//! Keys are identified by browser-style logical names (`"a"`, `"Escape"`,
//! `"ArrowUp"`, `"Control"`, `" "` for the space bar). Platform backends
//! translate their scan codes into these names before handing events to a
//! capture session.

/// Names of the modifier keys when they are pressed on their own.
pub const BARE_MODIFIERS: [&str; 4] = ["Control", "Alt", "Shift", "Meta"];

/// The default key that ends a capture session.
pub const DEFAULT_STOP_KEY: &str = "Escape";

/// Returns true if `key` is a modifier pressed without any other key.
pub fn is_bare_modifier(key: &str) -> bool {
    BARE_MODIFIERS.contains(&key)
}

/// Resolve the display label for a logical key name.
///
/// Named keys go through a fixed substitution table, single characters are
/// uppercased and anything else is passed through unchanged.
pub fn resolve_label(key: &str) -> String {
    let named = match key {
        " " => Some("Space"),
        "ArrowUp" => Some("↑"),
        "ArrowDown" => Some("↓"),
        "ArrowLeft" => Some("←"),
        "ArrowRight" => Some("→"),
        "Enter" => Some("Enter"),
        "Tab" => Some("Tab"),
        "Backspace" => Some("Backspace"),
        "Delete" => Some("Delete"),
        "Home" => Some("Home"),
        "End" => Some("End"),
        "PageUp" => Some("PageUp"),
        "PageDown" => Some("PageDown"),
        "Insert" => Some("Insert"),
        _ => None,
    };

    if let Some(label) = named {
        return label.to_string();
    }

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_uppercase().collect(),
        _ => key.to_string(),
    }
}

/// Normalize a hand-written key name like "esc" or "f5" into the logical
/// name used by key events. Unknown names are returned unchanged.
pub fn normalize_key_name(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        // A lone space survives trimming as empty; treat it as the space bar.
        return if s.is_empty() {
            String::new()
        } else {
            " ".to_string()
        };
    }

    let upper = trimmed.to_uppercase();
    let canonical = match upper.as_str() {
        "ESC" | "ESCAPE" => "Escape",
        "SPACE" | "SPACEBAR" => " ",
        "ENTER" | "RETURN" => "Enter",
        "TAB" => "Tab",
        "BACKSPACE" => "Backspace",
        "DELETE" | "DEL" => "Delete",
        "INSERT" | "INS" => "Insert",
        "HOME" => "Home",
        "END" => "End",
        "PAGEUP" | "PGUP" => "PageUp",
        "PAGEDOWN" | "PGDN" => "PageDown",
        "UP" | "ARROWUP" => "ArrowUp",
        "DOWN" | "ARROWDOWN" => "ArrowDown",
        "LEFT" | "ARROWLEFT" => "ArrowLeft",
        "RIGHT" | "ARROWRIGHT" => "ArrowRight",
        "SCROLLLOCK" | "SCROLL_LOCK" => "ScrollLock",
        "PAUSE" => "Pause",
        "CAPSLOCK" => "CapsLock",
        "CTRL" | "CONTROL" => "Control",
        "ALT" => "Alt",
        "SHIFT" => "Shift",
        "META" | "WIN" | "SUPER" | "CMD" => "Meta",
        _ => {
            if let Some(n) = upper.strip_prefix('F') {
                if let Ok(n) = n.parse::<u8>() {
                    if (1..=24).contains(&n) {
                        return format!("F{}", n);
                    }
                }
            }
            return trimmed.to_string();
        }
    };
    canonical.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_modifiers() {
        for name in ["Control", "Alt", "Shift", "Meta"] {
            assert!(is_bare_modifier(name));
        }
        assert!(!is_bare_modifier("Ctrl"));
        assert!(!is_bare_modifier("a"));
        assert!(!is_bare_modifier("Escape"));
    }

    #[test]
    fn test_resolve_named_keys() {
        assert_eq!(resolve_label(" "), "Space");
        assert_eq!(resolve_label("ArrowUp"), "↑");
        assert_eq!(resolve_label("ArrowDown"), "↓");
        assert_eq!(resolve_label("ArrowLeft"), "←");
        assert_eq!(resolve_label("ArrowRight"), "→");
        assert_eq!(resolve_label("PageDown"), "PageDown");
        assert_eq!(resolve_label("Insert"), "Insert");
    }

    #[test]
    fn test_resolve_single_char_uppercased() {
        assert_eq!(resolve_label("h"), "H");
        assert_eq!(resolve_label("B"), "B");
        assert_eq!(resolve_label("1"), "1");
        assert_eq!(resolve_label("ä"), "Ä");
        assert_eq!(resolve_label("ß"), "SS");
    }

    #[test]
    fn test_resolve_passes_through_other_names() {
        assert_eq!(resolve_label("F5"), "F5");
        assert_eq!(resolve_label("Escape"), "Escape");
        assert_eq!(resolve_label("CapsLock"), "CapsLock");
    }

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize_key_name("esc"), "Escape");
        assert_eq!(normalize_key_name("ESCAPE"), "Escape");
        assert_eq!(normalize_key_name("space"), " ");
        assert_eq!(normalize_key_name(" "), " ");
        assert_eq!(normalize_key_name("return"), "Enter");
        assert_eq!(normalize_key_name("up"), "ArrowUp");
        assert_eq!(normalize_key_name("f5"), "F5");
        assert_eq!(normalize_key_name("ctrl"), "Control");
    }

    #[test]
    fn test_normalize_unknown_passes_through() {
        assert_eq!(normalize_key_name("q"), "q");
        assert_eq!(normalize_key_name("F99"), "F99");
        assert_eq!(normalize_key_name("OPTION"), "OPTION");
        assert_eq!(normalize_key_name(""), "");
    }
}
