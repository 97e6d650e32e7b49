use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::lifecycle::{ChatResult, RequestLifecycle, ViewState};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,

    // Exchange state shared with the request lifecycle
    pub view: ViewState,

    // Input editing
    pub cursor: usize, // cursor position in view.input, in chars

    // Response pane geometry (updated during render) and scroll offset
    pub response_scroll: u16,
    pub response_height: u16,
    pub response_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub model: String,
    pub has_credential: bool,

    lifecycle: RequestLifecycle,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        lifecycle: RequestLifecycle,
        config: &Config,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            view: ViewState::default(),
            cursor: 0,
            response_scroll: 0,
            response_height: 0,
            response_width: 0,
            animation_frame: 0,
            model: config.model.clone(),
            has_credential: config.has_credential(),
            lifecycle,
            events,
        }
    }

    /// Send the current input. Refused while a request is outstanding or the
    /// input is blank.
    pub fn send(&mut self) -> bool {
        if self.view.busy {
            return false;
        }

        let input = self.view.input.clone();
        let events = self.events.clone();
        let accepted = self
            .lifecycle
            .submit(&mut self.view, &input, move |result| {
                // The UI may already be gone; nothing left to update then.
                let _ = events.send(AppEvent::Reply(result));
            })
            .is_some();

        if accepted {
            self.response_scroll = 0;
            self.animation_frame = 0;
        }
        accepted
    }

    pub fn receive_reply(&mut self, result: ChatResult) {
        debug!(success = result.is_success(), "Applying reply");
        self.view.settle(&result);
        self.response_scroll = 0;
    }

    pub fn clear(&mut self) {
        self.lifecycle.reset(&mut self.view);
        self.cursor = 0;
        self.response_scroll = 0;
    }

    pub fn tick_animation(&mut self) {
        if self.view.busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.view.input, self.cursor);
        self.view.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars() {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.view.input, self.cursor);
            self.view.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.view.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.view.input, self.cursor);
            self.view.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.view.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.view.input.chars().count();
    }

    // Response scrolling

    pub fn scroll_down(&mut self, lines: u16) {
        self.response_scroll = self
            .response_scroll
            .saturating_add(lines)
            .min(self.max_response_scroll());
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.response_scroll = self.response_scroll.saturating_sub(lines);
    }

    pub fn page_size(&self) -> u16 {
        self.response_height.saturating_sub(1).max(1)
    }

    fn max_response_scroll(&self) -> u16 {
        let wrap_width = if self.response_width > 0 {
            self.response_width as usize
        } else {
            80
        };

        let total_lines: usize = self
            .view
            .response
            .lines()
            .map(|line| {
                let len = line.chars().count();
                if len == 0 {
                    1
                } else {
                    len.div_ceil(wrap_width)
                }
            })
            .sum();

        (total_lines as u16).saturating_sub(self.response_height)
    }
}
