//! Code generation for the scmc toolchain.
//!
//! Three stages live here. [`lower`] flattens the analyzed statement tree
//! into a labeled linear instruction stream ([`ir`]), [`ir2`] prints that
//! stream in the textual IR2 form (and [`ir2_parse`] reads it back), and
//! [`binary`] lays out the version-specific `.scm` image.

pub mod binary;
pub mod ir;
pub mod ir2;
pub mod ir2_parse;
pub mod lower;

pub use binary::{emit_binary, BinaryOutput};
pub use ir::{IntWidth, IrItem, Instr, LabelId, Operand, ScriptIr, UsedModels};
pub use ir2::emit_ir2;
pub use ir2_parse::parse_ir2;
pub use lower::lower;
