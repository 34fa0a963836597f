use std::collections::HashSet;

use super::types::{InputEvent, Key, MouseButton};

/// Per-frame input deltas.
///
/// `InputState` provides the current state (held keys/buttons, pointer position).
/// `InputFrame` provides events, transitions and accumulated motion for the
/// current frame.
#[derive(Debug, Default)]
pub struct InputFrame {
    /// Raw events in arrival order.
    pub events: Vec<InputEvent>,

    pub keys_pressed: HashSet<Key>,
    pub keys_released: HashSet<Key>,
    pub buttons_pressed: HashSet<MouseButton>,
    pub buttons_released: HashSet<MouseButton>,

    /// Pointer motion this frame in logical pixels, `y` growing downwards.
    ///
    /// The first position after the pointer enters the window produces no motion.
    pub pointer_delta: (f32, f32),

    /// Vertical wheel motion this frame, in lines.
    pub scroll: f32,
}

impl InputFrame {
    pub fn clear(&mut self) {
        self.events.clear();
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.buttons_pressed.clear();
        self.buttons_released.clear();
        self.pointer_delta = (0.0, 0.0);
        self.scroll = 0.0;
    }

    pub fn push_event(&mut self, ev: InputEvent) {
        self.events.push(ev);
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys_pressed.contains(&key)
    }
}
