//! Command-line interface for pyrograph
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::{Args, Command, DiffArgs, GraphArgs, RecordArgs, RenderArgs, ResolverKind, SelfProfileArgs};
