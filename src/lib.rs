//! charmstore, a command line front end to a charm store kept on the local
//! filesystem.
//!
//! The engine itself lives in the `charm` crate; this crate only parses
//! arguments, initializes logging and opens the configured store.

#![warn(missing_docs)]

pub mod cli;
