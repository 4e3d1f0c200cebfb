mod args;
mod driver;
mod write;

pub use args::*;
pub use driver::{MZPiper, MZPiperError};
pub use write::{write_long, write_output, write_wide};
