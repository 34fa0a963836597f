/// Keyboard key identifier.
///
/// Keys without a variant map to `Key::Unknown` carrying the platform key code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    Space,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    Shift,
    Control,
    Alt,

    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,

    Unknown(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Modifier keys state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// Mouse wheel delta.
///
/// `Line` is notched wheel input; `Pixel` is high precision (touchpads).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MouseWheelDelta {
    Line { x: f32, y: f32 },
    Pixel { x: f32, y: f32 },
}

impl MouseWheelDelta {
    /// Logical pixels per wheel line.
    pub const PIXELS_PER_LINE: f32 = 20.0;

    /// Vertical delta in lines, positive away from the user.
    pub fn lines_y(&self) -> f32 {
        match *self {
            Self::Line { y, .. } => y,
            Self::Pixel { y, .. } => y / Self::PIXELS_PER_LINE,
        }
    }
}

/// Platform-agnostic input events emitted by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    ModifiersChanged(Modifiers),

    Key {
        key: Key,
        state: KeyState,
        /// True when event is a key-repeat.
        repeat: bool,
    },

    /// Pointer position in logical pixels.
    PointerMoved { x: f32, y: f32 },

    PointerButton {
        button: MouseButton,
        state: KeyState,
    },

    MouseWheel(MouseWheelDelta),

    /// Pointer left the window surface.
    PointerLeft,

    Focused(bool),
}
