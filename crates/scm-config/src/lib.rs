//! Compile-time configuration for the scmc toolchain.
//!
//! Three kinds of immutable state are built here before any compilation
//! job starts: the typed [`options::Options`] record, the
//! [`commands::CommandDb`] catalog of engine commands loaded from XML,
//! and the [`models::ModelRegistry`] mapping model names to ids from
//! IDE/DAT files. [`context::ProgramContext`] bundles them with the
//! diagnostic sink and is shared read-only by every job.

pub mod commands;
pub mod context;
pub mod models;
pub mod options;
pub mod xml;

pub use commands::{Alternator, ArgType, Command, CommandDb, CommandId, EnumDef, ParamDesc, ParamKind, ResolveError};
pub use context::ProgramContext;
pub use models::ModelRegistry;
pub use options::{Game, Options};
pub use xml::ConfigError;
