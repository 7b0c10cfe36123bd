pub mod resolver;
pub mod states;

pub use resolver::{resolve_promise, resolve_state, Resolution};
pub use states::{PromiseSnapshot, PromiseState, PromiseStateView, ResolvedBy};
