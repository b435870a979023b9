//! Built-in delivery actions.
//!
//! - `PrettyPrintAction` - indented JSON to stdout (the default)
//! - `ExecAction` - run a command with the payload on stdin

mod exec;
mod pretty_print;

pub use exec::ExecAction;
pub use pretty_print::PrettyPrintAction;
