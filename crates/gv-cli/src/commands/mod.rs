//! CLI command implementations

pub(crate) mod common;
pub(crate) mod down;
pub(crate) mod set_head;
pub(crate) mod status;
pub(crate) mod up;
