//! Key combo formatting.

use crate::event::KeyEvent;
use crate::key::resolve_label;

/// Modifier keys held during a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Only Ctrl held.
    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    /// Only Alt held.
    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    /// Only Shift held.
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    /// Only Meta (Win/Cmd/Super) held.
    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::default()
        }
    }

    /// Return a copy with Alt added.
    pub fn with_alt(self) -> Self {
        Self { alt: true, ..self }
    }

    /// Return a copy with Shift added.
    pub fn with_shift(self) -> Self {
        Self {
            shift: true,
            ..self
        }
    }

    /// Return a copy with Meta added.
    pub fn with_meta(self) -> Self {
        Self { meta: true, ..self }
    }

    /// Labels of the held modifiers, always in Ctrl, Alt, Shift, Win order.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut parts = Vec::with_capacity(4);
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.meta {
            parts.push("Win");
        }
        parts
    }
}

/// One formatted key combo, e.g. `Ctrl+Alt+H`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo(String);

impl KeyCombo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&KeyEvent> for KeyCombo {
    fn from(event: &KeyEvent) -> Self {
        format_key_combo(event)
    }
}

impl std::fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format a key event as a combo string like `Ctrl+Shift+↑`.
pub fn format_key_combo(event: &KeyEvent) -> KeyCombo {
    let label = resolve_label(&event.key);
    let mut parts: Vec<&str> = event.modifiers.labels();
    parts.push(label.as_str());
    KeyCombo(parts.join("+"))
}

/// Join combos the way they are shown and inserted: `"A, Ctrl+B"`.
pub fn join_combos(combos: &[KeyCombo]) -> String {
    combos
        .iter()
        .map(KeyCombo::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fmt(key: &str, modifiers: Modifiers) -> String {
        format_key_combo(&KeyEvent::with_modifiers(key, modifiers)).to_string()
    }

    #[test]
    fn test_plain_key() {
        assert_eq!(fmt("a", Modifiers::default()), "A");
        assert_eq!(fmt("F8", Modifiers::default()), "F8");
    }

    #[test]
    fn test_ctrl_alt() {
        assert_eq!(fmt("h", Modifiers::ctrl().with_alt()), "Ctrl+Alt+H");
    }

    #[test]
    fn test_all_modifiers_in_fixed_order() {
        let all = Modifiers::meta().with_shift().with_alt();
        let all = Modifiers { ctrl: true, ..all };
        assert_eq!(fmt("x", all), "Ctrl+Alt+Shift+Win+X");
    }

    #[test]
    fn test_named_keys_with_modifiers() {
        assert_eq!(fmt(" ", Modifiers::ctrl()), "Ctrl+Space");
        assert_eq!(fmt("ArrowLeft", Modifiers::shift()), "Shift+←");
        assert_eq!(fmt("Enter", Modifiers::meta()), "Win+Enter");
    }

    #[test]
    fn test_join_combos() {
        let combos = vec![
            format_key_combo(&KeyEvent::new("a")),
            format_key_combo(&KeyEvent::new("B")),
        ];
        assert_eq!(join_combos(&combos), "A, B");
        assert_eq!(join_combos(&[]), "");
    }

    fn modifiers() -> impl Strategy<Value = Modifiers> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(ctrl, alt, shift, meta)| Modifiers {
                ctrl,
                alt,
                shift,
                meta,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_prefixes_follow_fixed_order(mods in modifiers(), key in "[a-z0-9]") {
            let combo = fmt(&key, mods);
            let parts: Vec<&str> = combo.split('+').collect();
            let (prefix, last) = parts.split_at(parts.len() - 1);
            prop_assert_eq!(prefix.to_vec(), mods.labels());
            prop_assert_eq!(last[0].to_string(), key.to_uppercase());
        }

        #[test]
        fn prop_formatting_is_deterministic(mods in modifiers(), key in "\\PC{1,8}") {
            let event = KeyEvent::with_modifiers(key, mods);
            prop_assert_eq!(format_key_combo(&event), format_key_combo(&event.clone()));
        }
    }
}
