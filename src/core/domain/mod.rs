//! Domain types.

mod grant;
mod value;

pub use grant::{GrantEntry, GrantHandle, GrantOperation, GrantRequest, GrantSummary};
pub use value::{Key, Value, ValueList};
