pub mod engine;
pub mod error;
pub mod extent;
pub mod trace;

pub use engine::{append_all, Engine, Options, Outcome, Report};
pub use error::{Error, ErrorKind, Op};
