use std::collections::HashSet;

use super::frame::InputFrame;
use super::types::{InputEvent, Key, KeyState, Modifiers, MouseButton};

/// Current input state for a single window.
///
/// Holds "is down" information and current pointer position.
/// Per-frame transitions are recorded into an `InputFrame`.
#[derive(Debug, Default)]
pub struct InputState {
    pub modifiers: Modifiers,
    pub focused: bool,

    /// Pointer position in logical pixels.
    pub pointer_pos: Option<(f32, f32)>,

    pub keys_down: HashSet<Key>,
    pub buttons_down: HashSet<MouseButton>,
}

impl InputState {
    /// Applies a platform-agnostic input event to the current state and writes deltas to `frame`.
    pub fn apply_event(&mut self, frame: &mut InputFrame, ev: InputEvent) {
        match &ev {
            InputEvent::ModifiersChanged(m) => self.modifiers = *m,

            InputEvent::Focused(f) => {
                self.focused = *f;
                if !*f {
                    // Avoids stuck keys when focus changes mid-press.
                    self.keys_down.clear();
                    self.buttons_down.clear();
                }
            }

            InputEvent::PointerMoved { x, y } => {
                if let Some((px, py)) = self.pointer_pos {
                    frame.pointer_delta.0 += x - px;
                    frame.pointer_delta.1 += y - py;
                }
                self.pointer_pos = Some((*x, *y));
            }

            InputEvent::PointerLeft => self.pointer_pos = None,

            InputEvent::Key { key, state, .. } => match state {
                KeyState::Pressed => {
                    if self.keys_down.insert(*key) {
                        frame.keys_pressed.insert(*key);
                    }
                }
                KeyState::Released => {
                    if self.keys_down.remove(key) {
                        frame.keys_released.insert(*key);
                    }
                }
            },

            InputEvent::PointerButton { button, state } => match state {
                KeyState::Pressed => {
                    if self.buttons_down.insert(*button) {
                        frame.buttons_pressed.insert(*button);
                    }
                }
                KeyState::Released => {
                    if self.buttons_down.remove(button) {
                        frame.buttons_released.insert(*button);
                    }
                }
            },

            InputEvent::MouseWheel(delta) => frame.scroll += delta.lines_y(),
        }

        frame.push_event(ev);
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn button_down(&self, btn: MouseButton) -> bool {
        self.buttons_down.contains(&btn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MouseWheelDelta;

    fn key(key: Key, state: KeyState) -> InputEvent {
        InputEvent::Key { key, state, repeat: false }
    }

    #[test]
    fn key_transitions_are_recorded_once() {
        let mut state = InputState::default();
        let mut frame = InputFrame::default();

        state.apply_event(&mut frame, key(Key::W, KeyState::Pressed));
        state.apply_event(&mut frame, key(Key::W, KeyState::Pressed));
        assert!(state.key_down(Key::W));
        assert!(frame.key_pressed(Key::W));
        assert_eq!(frame.events.len(), 2);

        frame.clear();
        state.apply_event(&mut frame, key(Key::W, KeyState::Released));
        assert!(!state.key_down(Key::W));
        assert!(frame.keys_released.contains(&Key::W));
        assert!(frame.keys_pressed.is_empty());
    }

    #[test]
    fn first_pointer_position_produces_no_motion() {
        let mut state = InputState::default();
        let mut frame = InputFrame::default();

        state.apply_event(&mut frame, InputEvent::PointerMoved { x: 100.0, y: 100.0 });
        assert_eq!(frame.pointer_delta, (0.0, 0.0));

        state.apply_event(&mut frame, InputEvent::PointerMoved { x: 110.0, y: 95.0 });
        state.apply_event(&mut frame, InputEvent::PointerMoved { x: 112.0, y: 90.0 });
        assert_eq!(frame.pointer_delta, (12.0, -10.0));

        state.apply_event(&mut frame, InputEvent::PointerLeft);
        frame.clear();
        state.apply_event(&mut frame, InputEvent::PointerMoved { x: 0.0, y: 0.0 });
        assert_eq!(frame.pointer_delta, (0.0, 0.0));
    }

    #[test]
    fn wheel_accumulates_in_lines() {
        let mut state = InputState::default();
        let mut frame = InputFrame::default();

        state.apply_event(&mut frame, InputEvent::MouseWheel(MouseWheelDelta::Line { x: 0.0, y: 1.0 }));
        state.apply_event(
            &mut frame,
            InputEvent::MouseWheel(MouseWheelDelta::Pixel { x: 0.0, y: MouseWheelDelta::PIXELS_PER_LINE }),
        );
        assert_eq!(frame.scroll, 2.0);
    }

    #[test]
    fn focus_loss_releases_held_keys() {
        let mut state = InputState::default();
        let mut frame = InputFrame::default();
        state.apply_event(&mut frame, key(Key::A, KeyState::Pressed));
        state.apply_event(&mut frame, InputEvent::Focused(false));
        assert!(!state.key_down(Key::A));
    }
}
