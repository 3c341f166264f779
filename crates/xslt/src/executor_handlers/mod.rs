//! Execution handlers, one module per family of instructions. Each handler is
//! a free function over the executor, called from its dispatch `match`.

pub(crate) mod apply_templates;
pub(crate) mod call_template;
pub(crate) mod control_flow;
pub(crate) mod copy;
pub(crate) mod extension;
pub(crate) mod for_each;
pub(crate) mod literals;
pub(crate) mod variables;
