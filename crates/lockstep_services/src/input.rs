//! Local input sources
//!
//! The engine samples one [`InputSource`] per tick. These are the sources a
//! headless process can drive without a window.

use lockstep_core::{Button, InputSource, PackedInput};
use std::cell::Cell;
use std::rc::Rc;

/// The same buttons held down every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldInput {
    input: PackedInput,
}

impl HeldInput {
    pub fn new(buttons: &[Button]) -> Self {
        Self {
            input: PackedInput::from_buttons(buttons),
        }
    }

    pub fn input(&self) -> PackedInput {
        self.input
    }
}

impl InputSource for HeldInput {
    fn current(&mut self) -> PackedInput {
        self.input
    }
}

/// Plays back a fixed list of inputs, one per tick, then either loops or
/// falls silent.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    frames: Vec<PackedInput>,
    cursor: usize,
    looping: bool,
}

impl ScriptedInput {
    pub fn new(frames: impl IntoIterator<Item = PackedInput>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            cursor: 0,
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Frames not yet played in the current pass.
    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl InputSource for ScriptedInput {
    fn current(&mut self) -> PackedInput {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return PackedInput::NONE;
            }
            self.cursor = 0;
        }
        let input = self.frames[self.cursor];
        self.cursor += 1;
        input
    }
}

/// Input cell shared between the engine and whoever produces input.
///
/// The engine owns one clone as its source; the frame loop keeps another and
/// writes into it between frames.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    cell: Rc<Cell<PackedInput>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, input: PackedInput) {
        self.cell.set(input);
    }

    pub fn press(&self, button: Button, down: bool) {
        let mut input = self.cell.get();
        input.set_button(button, down);
        self.cell.set(input);
    }

    pub fn get(&self) -> PackedInput {
        self.cell.get()
    }
}

impl InputSource for SharedInput {
    fn current(&mut self) -> PackedInput {
        self.cell.get()
    }
}
