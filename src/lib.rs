//! This is the compiler as a library.  See the `src/bin` directory for the
//! `generator` executable using this library.

pub mod common;
pub mod front;
pub mod back;
