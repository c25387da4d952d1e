use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use thiserror::Error;

use crate::config::GestureConfig;

/// Keyboard gestures recognized on a view's input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// Pull the focused overlay out into its own window.
    Detach,
    /// Put a detached view back where it came from.
    Reattach,
    /// Close the detached window.
    Dismiss,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gesture::Detach => "Detach view",
            Gesture::Reattach => "Reattach view",
            Gesture::Dismiss => "Close detached window",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid key combo `{0}`")]
pub struct ParseComboError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl KeyCombo {
    pub fn new(code: KeyCode, mods: KeyModifiers) -> Self {
        Self { code, mods }
    }

    /// Letters match regardless of case; shift is then carried by `mods`.
    pub fn matches(&self, key: &KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }
        let code = match key.code {
            KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
            other => other,
        };
        code == self.code && key.modifiers == self.mods
    }

    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if self.mods.contains(KeyModifiers::CONTROL) {
            parts.push("Ctrl".to_string());
        }
        if self.mods.contains(KeyModifiers::SHIFT) {
            parts.push("Shift".to_string());
        }
        if self.mods.contains(KeyModifiers::ALT) {
            parts.push("Alt".to_string());
        }
        let code = match self.code {
            KeyCode::Char(c) => c.to_ascii_uppercase().to_string(),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Tab => "Tab".to_string(),
            KeyCode::F(n) => format!("F{}", n),
            _ => format!("{:?}", self.code),
        };
        parts.push(code);
        parts.join("+")
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl FromStr for KeyCombo {
    type Err = ParseComboError;

    /// Parses combos like `alt+d`, `ctrl+shift+r`, `esc` or `f5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseComboError(s.to_string());
        let mut mods = KeyModifiers::NONE;
        let mut code = None;
        for part in s.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" => mods |= KeyModifiers::CONTROL,
                "alt" | "option" => mods |= KeyModifiers::ALT,
                "shift" => mods |= KeyModifiers::SHIFT,
                _ if code.is_some() => return Err(err()),
                "esc" | "escape" => code = Some(KeyCode::Esc),
                "enter" | "return" => code = Some(KeyCode::Enter),
                "tab" => code = Some(KeyCode::Tab),
                "space" => code = Some(KeyCode::Char(' ')),
                p if p.len() > 1 && p.starts_with('f') => {
                    let n = p[1..].parse::<u8>().map_err(|_| err())?;
                    code = Some(KeyCode::F(n));
                }
                p => {
                    let mut chars = p.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => code = Some(KeyCode::Char(c)),
                        _ => return Err(err()),
                    }
                }
            }
        }
        code.map(|code| KeyCombo::new(code, mods)).ok_or_else(err)
    }
}

#[derive(Debug, Clone)]
pub struct GestureBindings {
    map: HashMap<Gesture, Vec<KeyCombo>>,
}

impl Default for GestureBindings {
    fn default() -> Self {
        use Gesture::*;
        let mut gb = Self::new();
        gb.add(Detach, KeyCombo::new(KeyCode::Char('d'), KeyModifiers::ALT));
        gb.add(Reattach, KeyCombo::new(KeyCode::Char('r'), KeyModifiers::ALT));
        gb.add(Dismiss, KeyCombo::new(KeyCode::Esc, KeyModifiers::NONE));
        gb
    }
}

impl GestureBindings {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Build from config strings. Combos that fail to parse are logged and
    /// skipped; a gesture left with none falls back to its default.
    pub fn from_config(cfg: &GestureConfig) -> Self {
        let defaults = Self::default();
        let mut gb = Self::new();
        for (gesture, combos) in [
            (Gesture::Detach, &cfg.detach),
            (Gesture::Reattach, &cfg.reattach),
            (Gesture::Dismiss, &cfg.dismiss),
        ] {
            for text in combos {
                match text.parse::<KeyCombo>() {
                    Ok(combo) => gb.add(gesture, combo),
                    Err(err) => tracing::warn!(%gesture, error = %err, "ignoring key combo"),
                }
            }
            if !gb.map.contains_key(&gesture) {
                for combo in defaults.map.get(&gesture).into_iter().flatten() {
                    gb.add(gesture, combo.clone());
                }
            }
        }
        gb
    }

    pub fn add(&mut self, gesture: Gesture, combo: KeyCombo) {
        self.map.entry(gesture).or_default().push(combo);
    }

    pub fn matches(&self, gesture: Gesture, key: &KeyEvent) -> bool {
        self.map
            .get(&gesture)
            .is_some_and(|list| list.iter().any(|c| c.matches(key)))
    }

    /// First gesture among `allowed` that `key` triggers.
    pub fn gesture_for(&self, key: &KeyEvent, allowed: &[Gesture]) -> Option<Gesture> {
        allowed.iter().copied().find(|g| self.matches(*g, key))
    }

    /// Return the display strings for all combos mapped to `gesture`.
    pub fn combos_for(&self, gesture: Gesture) -> Vec<String> {
        self.map
            .get(&gesture)
            .map(|list| list.iter().map(|c| c.display()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_alt_d_and_esc() {
        let gb = GestureBindings::default();
        let alt_d = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::ALT);
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert!(gb.matches(Gesture::Detach, &alt_d));
        assert_eq!(
            gb.gesture_for(&esc, &[Gesture::Reattach, Gesture::Dismiss]),
            Some(Gesture::Dismiss)
        );
        assert_eq!(gb.gesture_for(&esc, &[Gesture::Detach]), None);
    }

    #[test]
    fn parse_combos() {
        assert_eq!(
            "Ctrl+Shift+R".parse::<KeyCombo>().unwrap(),
            KeyCombo::new(
                KeyCode::Char('r'),
                KeyModifiers::CONTROL | KeyModifiers::SHIFT
            )
        );
        assert_eq!(
            "f5".parse::<KeyCombo>().unwrap(),
            KeyCombo::new(KeyCode::F(5), KeyModifiers::NONE)
        );
        assert!("alt+dd".parse::<KeyCombo>().is_err());
        assert!("alt".parse::<KeyCombo>().is_err());
        assert!("a+b".parse::<KeyCombo>().is_err());
    }

    #[test]
    fn config_falls_back_to_defaults_on_bad_entries() {
        let gb = GestureBindings::from_config(&GestureConfig {
            detach: vec!["nonsense+".into()],
            reattach: vec!["ctrl+r".into()],
            dismiss: vec![],
        });
        assert_eq!(gb.combos_for(Gesture::Detach), vec!["Alt+D"]);
        assert_eq!(gb.combos_for(Gesture::Reattach), vec!["Ctrl+R"]);
        assert_eq!(gb.combos_for(Gesture::Dismiss), vec!["Esc"]);
    }

    #[test]
    fn uppercase_letter_events_still_match() {
        let gb = GestureBindings::default();
        let ev = KeyEvent::new(KeyCode::Char('D'), KeyModifiers::ALT);
        assert!(gb.matches(Gesture::Detach, &ev));
    }
}
