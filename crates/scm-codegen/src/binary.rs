//! Binary `.scm` emission.
//!
//! Two passes: the first assigns every instruction its size and resolves
//! label positions, the second writes bytes. Instructions serialize as a
//! little-endian 16-bit opcode (high bit set for negated conditions)
//! followed by tagged operands; integers use the smallest width that
//! holds the value. The header is a chain of segments, each preceded by
//! a `GOTO` over it: variable space, used-model list, script info, and
//! (San Andreas) the streamed-script table. Mission and streamed scripts
//! store label targets as negated script-local offsets when
//! `use_local_offsets` is on.

use std::collections::HashMap;

use scm_config::{CommandId, ProgramContext};
use scm_syntax::diag::{DiagContext, Halted};
use scm_syntax::ScriptKind;

use crate::ir::{int_width, IndexVar, Instr, IntWidth, IrItem, LabelId, Operand, ScriptIr, UsedModels};

const DT_INT32: u8 = 0x01;
const DT_GVAR: u8 = 0x02;
const DT_LVAR: u8 = 0x03;
const DT_INT8: u8 = 0x04;
const DT_INT16: u8 = 0x05;
const DT_FLOAT: u8 = 0x06;
const DT_GARR: u8 = 0x07;
const DT_LARR: u8 = 0x08;
const DT_TEXT8: u8 = 0x09;
const DT_STRING: u8 = 0x0E;

/// Opcode word plus one tagged 32-bit operand.
const GOTO_SIZE: u32 = 7;
const MODEL_NAME_LEN: usize = 24;
const STREAM_NAME_LEN: usize = 20;
const NOT_FLAG: u16 = 0x8000;

pub struct BinaryOutput {
    /// The `.scm` image: header, main, subscripts, missions.
    pub image: Vec<u8>,
    /// Streamed scripts, one image per file (San Andreas).
    pub streamed: Vec<(String, Vec<u8>)>,
}

pub fn emit_binary(
    cx: &ProgramContext,
    scripts: &[ScriptIr],
    globals_words: u32,
) -> Result<BinaryOutput, Halted> {
    let mut models = UsedModels::new();
    // allocate used-model slots up front so operand sizes are final
    for script in scripts {
        for item in &script.items {
            if let IrItem::Instr(instr) = item {
                for arg in &instr.args {
                    if let Operand::Model(name) = arg {
                        models.value_of(name);
                    }
                }
            }
        }
    }

    let emitter = Emitter { cx, models };
    emitter.emit(scripts, globals_words)
}

struct Emitter<'a> {
    cx: &'a ProgramContext,
    models: UsedModels,
}

struct LaidOutScript<'a> {
    ir: &'a ScriptIr,
    base: u32,
    size: u32,
    labels: HashMap<LabelId, u32>,
}

impl<'a> Emitter<'a> {
    fn emit(mut self, scripts: &[ScriptIr], globals_words: u32) -> Result<BinaryOutput, Halted> {
        let opt = &self.cx.opt;
        let image_scripts: Vec<&ScriptIr> =
            scripts.iter().filter(|s| s.kind != ScriptKind::Streamed).collect();
        let streamed_scripts: Vec<&ScriptIr> =
            scripts.iter().filter(|s| s.kind == ScriptKind::Streamed).collect();
        let mission_count =
            image_scripts.iter().filter(|s| s.kind == ScriptKind::Mission).count() as u32;

        let headerless = opt.headerless || opt.cleo.is_some();
        let header_size = if headerless {
            0
        } else {
            let mut size = GOTO_SIZE + globals_words * 4;
            size += GOTO_SIZE + 4 + (MODEL_NAME_LEN as u32) * self.models.len() as u32;
            size += GOTO_SIZE + 12 + 4 * mission_count;
            if self.emits_streamed_table() {
                size += GOTO_SIZE + 4 + (STREAM_NAME_LEN as u32 + 8) * streamed_scripts.len() as u32;
            }
            size
        };

        // first pass: sizes and label offsets
        let mut laid_out: Vec<LaidOutScript<'_>> = Vec::with_capacity(image_scripts.len());
        let mut offset = header_size;
        for &script in &image_scripts {
            let (size, labels) = self.layout(script)?;
            laid_out.push(LaidOutScript { ir: script, base: offset, size, labels });
            offset += size;
        }
        let mut streamed_laid_out: Vec<LaidOutScript<'_>> = Vec::new();
        let mut streamed_offset = 0u32;
        for &script in &streamed_scripts {
            let (size, labels) = self.layout(script)?;
            streamed_laid_out.push(LaidOutScript { ir: script, base: streamed_offset, size, labels });
            streamed_offset += size;
        }

        // second pass: bytes
        let mut image = Vec::with_capacity(offset as usize);
        if !headerless {
            self.write_header(&mut image, globals_words, header_size, &laid_out, &streamed_laid_out)?;
            debug_assert_eq!(image.len() as u32, header_size);
        }
        for script in &laid_out {
            self.write_script(&mut image, script)?;
        }

        let mut streamed = Vec::with_capacity(streamed_laid_out.len());
        for script in &streamed_laid_out {
            let mut bytes = Vec::with_capacity(script.size as usize);
            self.write_script(&mut bytes, script)?;
            streamed.push((script.ir.name.clone(), bytes));
        }

        Ok(BinaryOutput { image, streamed })
    }

    fn emits_streamed_table(&self) -> bool {
        self.cx.opt.streamed_scripts && self.cx.opt.game == scm_config::Game::GtaSa
    }

    fn layout(&mut self, script: &ScriptIr) -> Result<(u32, HashMap<LabelId, u32>), Halted> {
        let mut labels = HashMap::new();
        let mut offset = 0u32;
        for item in &script.items {
            match item {
                IrItem::Label(id) => {
                    labels.insert(*id, offset);
                }
                IrItem::Instr(instr) => {
                    offset += self.instr_size(instr);
                }
            }
        }
        Ok((offset, labels))
    }

    fn instr_size(&mut self, instr: &Instr) -> u32 {
        2 + instr.args.iter().map(|arg| self.operand_size(arg)).sum::<u32>()
    }

    fn operand_size(&mut self, arg: &Operand) -> u32 {
        match arg {
            Operand::Int(v) => 1 + int_size(*v),
            Operand::Model(name) => 1 + int_size(self.models.value_of(name)),
            Operand::Float(v) => {
                if self.cx.opt.optimize_zero_floats && *v == 0.0 {
                    2
                } else if self.cx.opt.use_half_float {
                    3
                } else {
                    5
                }
            }
            Operand::GVar(_) | Operand::LVar(_) => 3,
            Operand::GArr { .. } | Operand::LArr { .. } => 7,
            Operand::TextLabel(_) => 9,
            Operand::String(s) => 2 + s.len().min(255) as u32,
            Operand::Label(_) => 5,
        }
    }

    fn write_header(
        &mut self,
        out: &mut Vec<u8>,
        globals_words: u32,
        header_size: u32,
        laid_out: &[LaidOutScript<'_>],
        streamed: &[LaidOutScript<'_>],
    ) -> Result<(), Halted> {
        let (goto_, _) = self.cx.supported_or_fatal(&DiagContext::None, "GOTO")?;
        let goto_opcode = self.cx.commands.command(goto_).opcode;

        // variable space
        let mut next = out.len() as u32 + GOTO_SIZE + globals_words * 4;
        write_goto(out, goto_opcode, next);
        out.resize(out.len() + globals_words as usize * 4, 0);

        // used models
        next += GOTO_SIZE + 4 + (MODEL_NAME_LEN as u32) * self.models.len() as u32;
        write_goto(out, goto_opcode, next);
        out.extend_from_slice(&(self.models.len() as u32).to_le_bytes());
        for name in self.models.names() {
            out.extend_from_slice(&fixed_name::<MODEL_NAME_LEN>(name));
        }

        // script info: where missions start, the largest mission, and
        // every mission's absolute offset
        let mission_bases: Vec<&LaidOutScript<'_>> =
            laid_out.iter().filter(|s| s.ir.kind == ScriptKind::Mission).collect();
        let main_size = mission_bases.first().map(|m| m.base).unwrap_or_else(|| {
            laid_out.last().map(|s| s.base + s.size).unwrap_or(header_size)
        });
        let largest_mission = mission_bases.iter().map(|m| m.size).max().unwrap_or(0);
        next += GOTO_SIZE + 12 + 4 * mission_bases.len() as u32;
        write_goto(out, goto_opcode, next);
        out.extend_from_slice(&main_size.to_le_bytes());
        out.extend_from_slice(&largest_mission.to_le_bytes());
        out.extend_from_slice(&(mission_bases.len() as u32).to_le_bytes());
        for mission in &mission_bases {
            out.extend_from_slice(&mission.base.to_le_bytes());
        }

        if self.emits_streamed_table() {
            // streamed images land in separate files; table offsets are
            // cumulative across them
            next += GOTO_SIZE + 4 + (STREAM_NAME_LEN as u32 + 8) * streamed.len() as u32;
            write_goto(out, goto_opcode, next);
            out.extend_from_slice(&(streamed.len() as u32).to_le_bytes());
            for script in streamed {
                out.extend_from_slice(&fixed_name::<STREAM_NAME_LEN>(&script.ir.name));
                out.extend_from_slice(&script.base.to_le_bytes());
                out.extend_from_slice(&script.size.to_le_bytes());
            }
        }
        Ok(())
    }

    fn write_script(&mut self, out: &mut Vec<u8>, script: &LaidOutScript<'_>) -> Result<(), Halted> {
        for item in &script.ir.items {
            if let IrItem::Instr(instr) = item {
                self.write_instr(out, instr, script)?;
            }
        }
        Ok(())
    }

    fn write_instr(
        &mut self,
        out: &mut Vec<u8>,
        instr: &Instr,
        script: &LaidOutScript<'_>,
    ) -> Result<(), Halted> {
        let command = self.cx.commands.command(instr.command);
        if !command.supported {
            return Err(self.cx.diag.internal_error(
                &DiagContext::None,
                &format!("unsupported command '{}' reached code generation", command.name),
            ));
        }
        let mut opcode = command.opcode;
        if instr.not {
            opcode |= NOT_FLAG;
        }
        out.extend_from_slice(&opcode.to_le_bytes());
        for arg in &instr.args {
            self.write_operand(out, arg, script)?;
        }
        Ok(())
    }

    fn write_operand(
        &mut self,
        out: &mut Vec<u8>,
        arg: &Operand,
        script: &LaidOutScript<'_>,
    ) -> Result<(), Halted> {
        match arg {
            Operand::Int(v) => write_int(out, *v),
            Operand::Model(name) => {
                let value = self.models.value_of(name);
                write_int(out, value);
            }
            Operand::Float(v) => {
                if self.cx.opt.optimize_zero_floats && *v == 0.0 {
                    out.push(DT_INT8);
                    out.push(0);
                } else if self.cx.opt.use_half_float {
                    out.push(DT_FLOAT);
                    let fixed = (*v * 16.0).round() as i16;
                    out.extend_from_slice(&fixed.to_le_bytes());
                } else {
                    out.push(DT_FLOAT);
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Operand::GVar(offset) => {
                out.push(DT_GVAR);
                out.extend_from_slice(&(*offset as u16).to_le_bytes());
            }
            Operand::LVar(slot) => {
                out.push(DT_LVAR);
                out.extend_from_slice(&(*slot as u16).to_le_bytes());
            }
            Operand::GArr { offset, index, len } => {
                write_array(out, DT_GARR, *offset, index, *len);
            }
            Operand::LArr { slot, index, len } => {
                write_array(out, DT_LARR, *slot, index, *len);
            }
            Operand::TextLabel(s) => {
                out.push(DT_TEXT8);
                out.extend_from_slice(&fixed_name::<8>(s));
            }
            Operand::String(s) => {
                out.push(DT_STRING);
                let bytes = &s.as_bytes()[..s.len().min(255)];
                out.push(bytes.len() as u8);
                out.extend_from_slice(bytes);
            }
            Operand::Label(id) => {
                let Some(&local) = script.labels.get(id) else {
                    return Err(self.cx.diag.internal_error(
                        &DiagContext::None,
                        &format!("unresolved label in script '{}'", script.ir.name),
                    ));
                };
                let value = if self.uses_local_offsets(script.ir.kind) {
                    -(local as i32)
                } else {
                    (script.base + local) as i32
                };
                out.push(DT_INT32);
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }

    fn uses_local_offsets(&self, kind: ScriptKind) -> bool {
        if self.cx.opt.cleo.is_some() {
            return true;
        }
        self.cx.opt.use_local_offsets && kind.is_mission_like()
    }
}

fn int_size(v: i32) -> u32 {
    match int_width(v) {
        IntWidth::I8 => 1,
        IntWidth::I16 => 2,
        IntWidth::I32 => 4,
    }
}

fn write_int(out: &mut Vec<u8>, v: i32) {
    match int_width(v) {
        IntWidth::I8 => {
            out.push(DT_INT8);
            out.extend_from_slice(&(v as i8).to_le_bytes());
        }
        IntWidth::I16 => {
            out.push(DT_INT16);
            out.extend_from_slice(&(v as i16).to_le_bytes());
        }
        IntWidth::I32 => {
            out.push(DT_INT32);
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn write_array(out: &mut Vec<u8>, tag: u8, base: u32, index: &IndexVar, len: u8) {
    out.push(tag);
    out.extend_from_slice(&(base as u16).to_le_bytes());
    let (index_value, local_index) = match index {
        IndexVar::Global(offset) => (*offset as u16, false),
        IndexVar::Local(slot) => (*slot as u16, true),
    };
    out.extend_from_slice(&index_value.to_le_bytes());
    out.push(len);
    out.push(if local_index { 0x80 } else { 0x00 });
}

fn write_goto(out: &mut Vec<u8>, opcode: u16, target: u32) {
    out.extend_from_slice(&opcode.to_le_bytes());
    out.push(DT_INT32);
    out.extend_from_slice(&(target as i32).to_le_bytes());
}

fn fixed_name<const N: usize>(name: &str) -> [u8; N] {
    let mut bytes = [0u8; N];
    for (i, b) in name.bytes().take(N - 1).enumerate() {
        bytes[i] = b.to_ascii_uppercase();
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir2::tests::{compile_main, test_context};

    fn compile_bytes(src: &str, mutate: impl FnOnce(&mut scm_config::Options)) -> Vec<u8> {
        let cx = test_context(|opt| {
            opt.headerless = true;
            mutate(opt);
        });
        let script = compile_main(&cx, src);
        assert!(!cx.diag.has_errors());
        let words = script.storage_watermark;
        emit_binary(&cx, &[script], words).unwrap().image
    }

    #[test]
    fn opcode_and_int8_operand() {
        let bytes = compile_bytes("WAIT 0\n", |_| {});
        assert_eq!(bytes, vec![0x01, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn integer_widths_are_minimal() {
        let bytes = compile_bytes("WAIT 200\nWAIT 40000\n", |_| {});
        assert_eq!(
            bytes,
            vec![
                0x01, 0x00, 0x05, 0xC8, 0x00, // WAIT 200i16
                0x01, 0x00, 0x01, 0x40, 0x9C, 0x00, 0x00, // WAIT 40000i32
            ]
        );
    }

    #[test]
    fn negated_condition_sets_the_opcode_high_bit() {
        let bytes = compile_bytes("VAR_INT x\nIF NOT x = 0\nWAIT 0\nENDIF\n", |_| {});
        // ANDOR 0; NOT IS_INT_VAR_EQUAL_TO_NUMBER ...
        let pos = bytes
            .windows(2)
            .position(|w| w == [0x38, 0x80])
            .expect("negated opcode not found");
        assert!(pos > 0);
    }

    #[test]
    fn global_var_and_float_operands() {
        let bytes = compile_bytes("VAR_FLOAT f\nf = 1.5\n", |_| {});
        assert_eq!(
            bytes,
            vec![0x05, 0x00, 0x02, 0x00, 0x00, 0x06, 0x00, 0x00, 0xC0, 0x3F]
        );
    }

    #[test]
    fn half_float_storage() {
        let bytes = compile_bytes("VAR_FLOAT f\nf = 1.5\n", |opt| opt.use_half_float = true);
        // 1.5 * 16 = 24
        assert_eq!(bytes, vec![0x05, 0x00, 0x02, 0x00, 0x00, 0x06, 0x18, 0x00]);
    }

    #[test]
    fn zero_floats_can_shrink_to_int8() {
        let bytes = compile_bytes("VAR_FLOAT f\nf = 0.0\n", |opt| opt.optimize_zero_floats = true);
        assert_eq!(bytes, vec![0x05, 0x00, 0x02, 0x00, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn labels_resolve_to_absolute_offsets() {
        let bytes = compile_bytes("start:\nWAIT 0\nGOTO start\n", |_| {});
        // WAIT 0 (4 bytes) then GOTO with target 0
        assert_eq!(&bytes[4..], &[0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn cleo_scripts_use_negated_local_offsets() {
        let cx = test_context(|opt| opt.cleo = Some(3));
        let script = compile_main(&cx, "GOTO fin\nWAIT 0\nfin:\nWAIT 0\n");
        assert!(!cx.diag.has_errors());
        let bytes = emit_binary(&cx, &[script], 0).unwrap().image;
        // GOTO (7 bytes) + WAIT 0 (4 bytes) puts fin at offset 11
        let target = i32::from_le_bytes(bytes[3..7].try_into().unwrap());
        assert_eq!(target, -11);
    }

    #[test]
    fn text_label_operands_are_eight_bytes() {
        let bytes = compile_bytes("PRINT_HELP HELP_1\n", |_| {});
        assert_eq!(bytes[0..2], [0xE5, 0x03]);
        assert_eq!(bytes[2], DT_TEXT8);
        assert_eq!(&bytes[3..11], b"HELP_1\0\0");
    }

    #[test]
    fn string_operands_are_length_prefixed() {
        let bytes = compile_bytes("SAVE_STRING_TO_DEBUG_FILE \"Hi\"\n", |_| {});
        assert_eq!(&bytes[2..], &[DT_STRING, 2, b'H', b'i']);
    }

    #[test]
    fn header_segments_chain_with_gotos() {
        let cx = test_context(|_| {});
        let script = compile_main(&cx, "VAR_INT a b\na = 1\n");
        assert!(!cx.diag.has_errors());
        let words = script.storage_watermark;
        assert_eq!(words, 2);
        let bytes = emit_binary(&cx, &[script], words).unwrap().image;

        // segment 1: GOTO over the 8-byte variable space
        assert_eq!(bytes[0..2], [0x02, 0x00]);
        assert_eq!(bytes[2], DT_INT32);
        let seg2 = i32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
        assert_eq!(seg2, 7 + 8);

        // segment 2: used models (none)
        assert_eq!(bytes[seg2..seg2 + 2], [0x02, 0x00]);
        let seg3 = i32::from_le_bytes(bytes[seg2 + 3..seg2 + 7].try_into().unwrap()) as usize;
        let model_count = u32::from_le_bytes(bytes[seg2 + 7..seg2 + 11].try_into().unwrap());
        assert_eq!(model_count, 0);

        // segment 3: script info; main_size equals the header size and
        // the code follows immediately
        let header_size = i32::from_le_bytes(bytes[seg3 + 3..seg3 + 7].try_into().unwrap()) as usize;
        let main_size = u32::from_le_bytes(bytes[seg3 + 7..seg3 + 11].try_into().unwrap());
        let largest_mission = u32::from_le_bytes(bytes[seg3 + 11..seg3 + 15].try_into().unwrap());
        let mission_count = u32::from_le_bytes(bytes[seg3 + 15..seg3 + 19].try_into().unwrap());
        assert_eq!(main_size as usize, bytes.len());
        assert_eq!(largest_mission, 0);
        assert_eq!(mission_count, 0);
        // SET_VAR_INT &0 1i8
        assert_eq!(&bytes[header_size..], &[0x04, 0x00, 0x02, 0x00, 0x00, 0x04, 0x01]);
    }

    #[test]
    fn used_models_land_in_the_header() {
        let cx = test_context(|_| {});
        let script =
            compile_main(&cx, "VAR_INT car\nCREATE_CAR LANDSTAL 0.0 0.0 0.0 car\n");
        assert!(!cx.diag.has_errors());
        let bytes = emit_binary(&cx, &[script], 1).unwrap().image;
        let seg2 = i32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
        let model_count = u32::from_le_bytes(bytes[seg2 + 7..seg2 + 11].try_into().unwrap());
        assert_eq!(model_count, 1);
        assert_eq!(&bytes[seg2 + 11..seg2 + 19], b"LANDSTAL");
        assert_eq!(bytes[seg2 + 19..seg2 + 35], [0u8; 16]);
    }

    #[test]
    fn streamed_scripts_emit_separate_images_and_a_table() {
        let cx = test_context(|opt| opt.streamed_scripts = true);
        let main = compile_main(&cx, "WAIT 0\n");
        let mut streamed = compile_main(&cx, "WAIT 250\n");
        streamed.kind = ScriptKind::Streamed;
        streamed.name = "AMBULAN".into();
        assert!(!cx.diag.has_errors());
        let output = emit_binary(&cx, &[main, streamed], 0).unwrap();

        assert_eq!(output.streamed.len(), 1);
        assert_eq!(output.streamed[0].0, "AMBULAN");
        assert_eq!(output.streamed[0].1, vec![0x01, 0x00, 0x05, 0xFA, 0x00]);

        // fourth header segment holds the table record
        let bytes = &output.image;
        let seg2 = i32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
        let seg3 = i32::from_le_bytes(bytes[seg2 + 3..seg2 + 7].try_into().unwrap()) as usize;
        let seg4 = i32::from_le_bytes(bytes[seg3 + 3..seg3 + 7].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(bytes[seg4 + 7..seg4 + 11].try_into().unwrap());
        assert_eq!(count, 1);
        assert_eq!(&bytes[seg4 + 11..seg4 + 18], b"AMBULAN");
        let size = u32::from_le_bytes(bytes[seg4 + 35..seg4 + 39].try_into().unwrap());
        assert_eq!(size, 5);
    }

    #[test]
    fn repeated_compilation_is_byte_identical() {
        let src = "VAR_INT x\nSWITCH x\nCASE 1\nBREAK\nCASE 2\nBREAK\nENDSWITCH\n";
        let a = compile_bytes(src, |_| {});
        let b = compile_bytes(src, |_| {});
        assert_eq!(a, b);
    }

    #[test]
    fn mission_offsets_are_recorded() {
        let cx = test_context(|_| {});
        let main = compile_main(&cx, "WAIT 0\n");
        let mut mission = compile_main(&cx, "loop:\nWAIT 0\nGOTO loop\n");
        mission.kind = ScriptKind::Mission;
        mission.name = "MIS0".into();
        assert!(!cx.diag.has_errors());
        let bytes = emit_binary(&cx, &[main, mission], 0).unwrap().image;

        let seg2 = i32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
        let seg3 = i32::from_le_bytes(bytes[seg2 + 3..seg2 + 7].try_into().unwrap()) as usize;
        let header_size = i32::from_le_bytes(bytes[seg3 + 3..seg3 + 7].try_into().unwrap()) as usize;
        let main_size = u32::from_le_bytes(bytes[seg3 + 7..seg3 + 11].try_into().unwrap()) as usize;
        let largest = u32::from_le_bytes(bytes[seg3 + 11..seg3 + 15].try_into().unwrap());
        let count = u32::from_le_bytes(bytes[seg3 + 15..seg3 + 19].try_into().unwrap());
        let mission_off = u32::from_le_bytes(bytes[seg3 + 19..seg3 + 23].try_into().unwrap()) as usize;

        assert_eq!(count, 1);
        assert_eq!(main_size, header_size + 4);
        assert_eq!(mission_off, main_size);
        assert_eq!(largest as usize, bytes.len() - mission_off);

        // inside the mission, the GOTO target is a negated local offset
        // (SA defaults to local offsets for missions): loop sits at 0
        let goto_target =
            i32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(goto_target, 0);
    }
}
