//! The emulator's transition table.
//!
//! Transitions are registered as code ranges `(from..=to) -> (action,
//! next state)` and expanded into a per-state map, so the hot path is
//! a single lookup. Later registrations overwrite earlier ones, which
//! lets the ESC table carve exceptions (`[`, `]`, DEL) out of the
//! broad C1 and append ranges.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::{Emulator, actions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Start,
    Esc,
    Csi,
    Osc,
}

pub type ActionFn = fn(&mut Emulator, char);

#[derive(Clone, Copy)]
pub struct Transition {
    pub action: Option<ActionFn>,
    pub next: Option<StateId>,
}

pub struct StateTable {
    transitions: HashMap<u32, Transition>,
    pub default: Option<ActionFn>,
}

impl StateTable {
    fn new(default: Option<ActionFn>) -> Self {
        Self {
            transitions: HashMap::new(),
            default,
        }
    }

    fn add(&mut self, from: u32, to: u32, action: Option<ActionFn>, next: Option<StateId>) {
        for code in from..=to {
            self.transitions.insert(code, Transition { action, next });
        }
    }

    pub fn lookup(&self, code: u32) -> Option<Transition> {
        self.transitions.get(&code).copied()
    }
}

pub struct Table {
    start: StateTable,
    esc: StateTable,
    csi: StateTable,
    osc: StateTable,
}

impl Table {
    pub fn state(&self, id: StateId) -> &StateTable {
        match id {
            StateId::Start => &self.start,
            StateId::Esc => &self.esc,
            StateId::Csi => &self.csi,
            StateId::Osc => &self.osc,
        }
    }
}

pub fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(build)
}

fn build() -> Table {
    let mut start = StateTable::new(Some(actions::insert_char as ActionFn));
    start.add(0x00, 0x1f, Some(actions::c0_control), None);
    start.add(0x9b, 0x9b, None, Some(StateId::Csi));
    start.add(0x1b, 0x1b, None, Some(StateId::Esc));

    let mut esc = StateTable::new(Some(actions::error as ActionFn));
    esc.add(0x20, 0x2f, Some(actions::append_param), None);
    esc.add(0x30, 0x3f, Some(actions::private_function), Some(StateId::Start));
    esc.add(0x40, 0x5f, Some(actions::c1_control), Some(StateId::Start));
    esc.add(0x60, 0x7e, Some(actions::two_char_escape), Some(StateId::Start));
    esc.add(0x7f, 0x7f, None, None); // DEL always ignored
    esc.add(0x20, 0x20, Some(actions::insert_space), None);
    esc.add(0xa0, 0xa0, Some(actions::insert_space), None);
    esc.add('[' as u32, '[' as u32, None, Some(StateId::Csi));
    esc.add(']' as u32, ']' as u32, None, Some(StateId::Osc));

    let mut osc = StateTable::new(Some(actions::error as ActionFn));
    osc.add(0x20, 0x7e, Some(actions::append_param), None);
    osc.add(0x07, 0x07, Some(actions::osc_dispatch), Some(StateId::Start));
    osc.add(0x9c, 0x9c, Some(actions::osc_dispatch), Some(StateId::Start));

    let mut csi = StateTable::new(Some(actions::error as ActionFn));
    csi.add(0x30, 0x3f, Some(actions::append_param), None);
    csi.add(0x40, 0x7e, Some(actions::csi_dispatch), Some(StateId::Start));

    Table {
        start,
        esc,
        csi,
        osc,
    }
}
