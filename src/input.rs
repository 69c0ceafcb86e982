use crate::error::Result;

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// External synthetic-input collaborator.
///
/// All coordinates are absolute screen pixels at the moment of the call.
pub trait InputDriver: Send + Sync {
    fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<()>;

    fn double_click_at(&self, x: i32, y: i32) -> Result<()>;

    /// Type text into whatever currently has focus.
    fn send_text(&self, text: &str) -> Result<()>;

    /// Press and release a named key (e.g. "enter", "tab").
    fn send_key(&self, key: &str) -> Result<()>;

    /// Scroll the underlying page so the given point is in view.
    fn scroll_to(&self, x: i32, y: i32) -> Result<()>;

    /// Current scroll position of the underlying page.
    fn scroll_position(&self) -> Result<(i32, i32)>;
}
