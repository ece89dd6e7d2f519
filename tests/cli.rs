//! CLI integration tests.

mod support;

#[path = "cli/errors.rs"]
mod errors;
#[path = "cli/secrets.rs"]
mod secrets;
