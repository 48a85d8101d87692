pub mod shell;
pub mod tokenize;
pub mod types;

pub use shell::segments;
pub use tokenize::{CommandWords, base_name, split_assignment, split_command, tokenize};
pub use types::{Redirect, Segment};
