use std::path::PathBuf;

use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::{trace, warn};

/// Single line prompt used to type the path of the file to open.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    cursor_pos: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub cursor_pos: usize,
}

impl InputResult {
    /// The typed path with `~` and environment variables expanded.
    /// `None` for a cancelled or blank prompt.
    pub fn as_path(&self) -> Option<PathBuf> {
        let raw = self.input.trim();
        if self.canceled || raw.is_empty() {
            return None;
        }
        let expanded = match shellexpand::full(raw) {
            Ok(expanded) => expanded.into_owned(),
            Err(e) => {
                warn!("Could not expand \"{raw}\": {e}");
                raw.to_string()
            }
        };
        trace!("Prompt path {raw} => {expanded}");
        Some(PathBuf::from(expanded))
    }
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (kc, km) => self.key(kc, km),
        }
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            cursor_pos: self.cursor_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.cursor_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.clear();
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.cursor_pos > 0 {
            self.cursor_pos -= 1;
            let pos = self.byte_pos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.cursor_pos < self.current_input.chars().count() {
            self.cursor_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.cursor_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.cursor_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, modifier: KeyModifiers) -> InputResult {
        if modifier.contains(KeyModifiers::CONTROL) {
            return self.get();
        }
        if let Some(chr) = code.as_char() {
            let pos = self.byte_pos();
            self.current_input.insert(pos, chr);
            self.cursor_pos += 1;
        }
        self.get()
    }

    fn byte_pos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.cursor_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(input: &mut Inputter, code: KeyCode) -> InputResult {
        input.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(input: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(input, KeyCode::Char(c));
        }
    }

    #[test]
    fn typing_and_editing() {
        let mut input = Inputter::default();
        type_str(&mut input, "/d/reprt.xlsx");
        for _ in 0..7 {
            press(&mut input, KeyCode::Left);
        }
        type_str(&mut input, "o");
        press(&mut input, KeyCode::End);
        press(&mut input, KeyCode::Backspace);
        let result = press(&mut input, KeyCode::Enter);
        assert!(result.finished);
        assert!(!result.canceled);
        assert_eq!(result.input, "/d/report.xls");
        assert_eq!(result.as_path(), Some(PathBuf::from("/d/report.xls")));
    }

    #[test]
    fn non_ascii_input_is_edited_by_char() {
        let mut input = Inputter::default();
        type_str(&mut input, "/tmp/bücher.csv");
        press(&mut input, KeyCode::Home);
        for _ in 0..7 {
            press(&mut input, KeyCode::Right);
        }
        let result = press(&mut input, KeyCode::Backspace);
        assert_eq!(result.input, "/tmp/bcher.csv");
    }

    #[test]
    fn escape_cancels() {
        let mut input = Inputter::default();
        type_str(&mut input, "/d/report.xlsx");
        let result = press(&mut input, KeyCode::Esc);
        assert!(result.finished);
        assert!(result.canceled);
        assert_eq!(result.as_path(), None);
    }

    #[test]
    fn blank_prompt_has_no_path() {
        let mut input = Inputter::default();
        type_str(&mut input, "   ");
        let result = press(&mut input, KeyCode::Enter);
        assert_eq!(result.as_path(), None);
    }

    #[test]
    fn home_directory_is_expanded() {
        let mut input = Inputter::default();
        type_str(&mut input, "~/names.xlsx");
        let path = press(&mut input, KeyCode::Enter).as_path().unwrap();
        assert!(!path.starts_with("~"));
        assert!(path.ends_with("names.xlsx"));
    }
}
