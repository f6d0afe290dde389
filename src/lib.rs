//! simconf: flag-gated configuration templates for LPJmL runs.
//!
//! A [`Template`](template::Template) is a tree of entries, conditionals,
//! includes and macro definitions. [`Engine::resolve`](engine::Engine::resolve)
//! walks it under one [`FlagSet`](flags::FlagSet), expands macros and
//! validates the result into a [`Manifest`](manifest::Manifest).

pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod format;
pub mod logging;
pub mod macros;
pub mod manifest;
pub mod resolver;
pub mod scenario;
pub mod template;
pub mod validator;

pub use error::{Error, Result};
