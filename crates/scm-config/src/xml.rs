//! XML command database loader.
//!
//! The database file lists commands with their opcodes and parameter
//! descriptors, alternator groups, and enums:
//!
//! ```xml
//! <GTA3Script>
//!   <Commands>
//!     <Command Name="WAIT" ID="0x0001">
//!       <Args><Arg Type="INPUT_INT"/></Args>
//!     </Command>
//!   </Commands>
//!   <Alternators>
//!     <Alternator Name="SET"><Alternative Command="SET_VAR_INT"/></Alternator>
//!   </Alternators>
//!   <Enums>
//!     <Enum Name="FADE"><Constant Name="FADE_OUT" Value="0"/></Enum>
//!   </Enums>
//! </GTA3Script>
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::commands::{Alternator, Command, CommandDb, EnumDef, ParamDesc, ParamKind};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Xml(quick_xml::Error),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {e}"),
            ConfigError::Xml(e) => write!(f, "XML error: {e}"),
            ConfigError::Parse(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<quick_xml::Error> for ConfigError {
    fn from(e: quick_xml::Error) -> Self {
        ConfigError::Xml(e)
    }
}

pub fn load_commands(path: &Path) -> Result<CommandDb, ConfigError> {
    let file = File::open(path)?;
    parse_commands(Reader::from_reader(BufReader::new(file)))
}

pub fn load_commands_str(xml: &str) -> Result<CommandDb, ConfigError> {
    parse_commands(Reader::from_reader(xml.as_bytes()))
}

#[derive(Default)]
struct RawParam {
    kind: String,
    enum_name: Option<String>,
    optional: bool,
    out: bool,
    entity: Option<String>,
}

#[derive(Default)]
struct RawCommand {
    name: String,
    opcode: u16,
    supported: bool,
    is_keyword: bool,
    params: Vec<RawParam>,
}

fn parse_commands<R: BufRead>(mut xml: Reader<R>) -> Result<CommandDb, ConfigError> {
    let mut raw_commands: Vec<RawCommand> = Vec::new();
    let mut raw_alternators: Vec<(String, Vec<String>)> = Vec::new();
    let mut enums: Vec<EnumDef> = Vec::new();

    let mut current_command: Option<RawCommand> = None;
    let mut current_alternator: Option<(String, Vec<String>)> = None;
    let mut current_enum: Option<EnumDef> = None;

    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "Command" => current_command = Some(read_command_attrs(e)?),
                    "Alternator" => {
                        current_alternator = Some((require_attr(e, "Name")?, Vec::new()));
                    }
                    "Enum" => {
                        let name = require_attr(e, "Name")?;
                        let global =
                            attr(e, "Global")?.map(|v| parse_bool(&v)).transpose()?.unwrap_or(false);
                        current_enum = Some(EnumDef { name, global, constants: Vec::new() });
                    }
                    _ => {}
                }
            }
            // Self-closing leaf elements; a bodyless <Command .../> is a
            // zero-argument command and completes immediately.
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "Command" => raw_commands.push(read_command_attrs(e)?),
                    "Arg" => {
                        let param = read_arg_attrs(e)?;
                        match current_command.as_mut() {
                            Some(cmd) => cmd.params.push(param),
                            None => {
                                return Err(ConfigError::Parse("<Arg> outside <Command>".into()))
                            }
                        }
                    }
                    "Alternative" => {
                        let target = require_attr(e, "Command")?;
                        match current_alternator.as_mut() {
                            Some((_, list)) => list.push(target),
                            None => {
                                return Err(ConfigError::Parse(
                                    "<Alternative> outside <Alternator>".into(),
                                ))
                            }
                        }
                    }
                    "Constant" => {
                        let name = require_attr(e, "Name")?.to_ascii_uppercase();
                        let value = parse_int(&require_attr(e, "Value")?)?;
                        match current_enum.as_mut() {
                            Some(def) => def.constants.push((name, value)),
                            None => {
                                return Err(ConfigError::Parse("<Constant> outside <Enum>".into()))
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "Command" => {
                        if let Some(cmd) = current_command.take() {
                            raw_commands.push(cmd);
                        }
                    }
                    "Alternator" => {
                        if let Some(alt) = current_alternator.take() {
                            raw_alternators.push(alt);
                        }
                    }
                    "Enum" => {
                        if let Some(def) = current_enum.take() {
                            enums.push(def);
                        }
                    }
                    _ => {}
                }
            }
            Err(e) => return Err(ConfigError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    build_db(raw_commands, raw_alternators, enums)
}

fn build_db(
    raw_commands: Vec<RawCommand>,
    raw_alternators: Vec<(String, Vec<String>)>,
    enums: Vec<EnumDef>,
) -> Result<CommandDb, ConfigError> {
    let mut db = CommandDb::new();
    for def in enums {
        db.add_enum(def);
    }
    for raw in raw_commands {
        let mut params = Vec::with_capacity(raw.params.len());
        for p in &raw.params {
            let kind = param_kind(&p.kind)
                .ok_or_else(|| ConfigError::Parse(format!("unknown arg type '{}'", p.kind)))?;
            let enum_ref = match &p.enum_name {
                Some(name) => Some(db.find_enum(name).ok_or_else(|| {
                    ConfigError::Parse(format!("unknown enum '{name}' in command '{}'", raw.name))
                })?),
                None => None,
            };
            let entity = p.entity.as_deref().map(|name| db.entity_id(name));
            let out = p.out || matches!(kind, ParamKind::OutputInt | ParamKind::OutputFloat);
            params.push(ParamDesc { kind, enum_ref, optional: p.optional, out, entity });
        }
        db.add_command(Command {
            name: raw.name.to_ascii_uppercase(),
            opcode: raw.opcode,
            supported: raw.supported,
            params,
            is_keyword: raw.is_keyword,
        });
    }
    for (name, targets) in raw_alternators {
        let mut ids = Vec::with_capacity(targets.len());
        for target in &targets {
            let (id, _) = db.find_command(target).ok_or_else(|| {
                ConfigError::Parse(format!("alternator '{name}' references unknown command '{target}'"))
            })?;
            ids.push(id);
        }
        db.add_alternator(Alternator { name: name.to_ascii_uppercase(), commands: ids });
    }
    Ok(db)
}

fn read_command_attrs(e: &BytesStart<'_>) -> Result<RawCommand, ConfigError> {
    let name = require_attr(e, "Name")?;
    let opcode = parse_int(&require_attr(e, "ID")?)? as u16;
    let supported = attr(e, "Supported")?.map(|v| parse_bool(&v)).transpose()?.unwrap_or(true);
    let is_keyword = attr(e, "IsKeyword")?.map(|v| parse_bool(&v)).transpose()?.unwrap_or(false);
    Ok(RawCommand { name, opcode, supported, is_keyword, params: Vec::new() })
}

fn read_arg_attrs(e: &BytesStart<'_>) -> Result<RawParam, ConfigError> {
    Ok(RawParam {
        kind: require_attr(e, "Type")?,
        enum_name: attr(e, "Enum")?,
        optional: attr(e, "Optional")?.map(|v| parse_bool(&v)).transpose()?.unwrap_or(false),
        out: attr(e, "Out")?.map(|v| parse_bool(&v)).transpose()?.unwrap_or(false),
        entity: attr(e, "Entity")?,
    })
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, ConfigError> {
    for a in e.attributes() {
        let a = a.map_err(|e| ConfigError::Parse(e.to_string()))?;
        if a.key.as_ref() == key.as_bytes() {
            return Ok(Some(String::from_utf8_lossy(&a.value).to_string()));
        }
    }
    Ok(None)
}

fn require_attr(e: &BytesStart<'_>, key: &str) -> Result<String, ConfigError> {
    attr(e, key)?.ok_or_else(|| {
        let element = String::from_utf8_lossy(e.name().as_ref()).to_string();
        ConfigError::Parse(format!("<{element}> missing attribute '{key}'"))
    })
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::Parse(format!("expected boolean, found '{other}'"))),
    }
}

fn parse_int(value: &str) -> Result<i32, ConfigError> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        value.parse::<i64>()
    };
    parsed
        .ok()
        .and_then(|v| i32::try_from(v).ok().or(u32::try_from(v).ok().map(|u| u as i32)))
        .ok_or_else(|| ConfigError::Parse(format!("invalid integer '{value}'")))
}

pub(crate) fn param_kind(name: &str) -> Option<ParamKind> {
    Some(match name.to_ascii_uppercase().as_str() {
        "INT" => ParamKind::Int,
        "FLOAT" => ParamKind::Float,
        "VAR_INT" => ParamKind::VarInt,
        "LVAR_INT" => ParamKind::LVarInt,
        "VAR_FLOAT" => ParamKind::VarFloat,
        "LVAR_FLOAT" => ParamKind::LVarFloat,
        "VAR_TEXT_LABEL" => ParamKind::VarTextLabel,
        "LVAR_TEXT_LABEL" => ParamKind::LVarTextLabel,
        "INPUT_INT" => ParamKind::InputInt,
        "INPUT_FLOAT" => ParamKind::InputFloat,
        "OUTPUT_INT" => ParamKind::OutputInt,
        "OUTPUT_FLOAT" => ParamKind::OutputFloat,
        "LABEL" => ParamKind::Label,
        "TEXT_LABEL" => ParamKind::TextLabel,
        "STRING" => ParamKind::String,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <GTA3Script>
          <Enums>
            <Enum Name="FADE">
              <Constant Name="FADE_OUT" Value="0"/>
              <Constant Name="FADE_IN" Value="1"/>
            </Enum>
            <Enum Name="BOOL" Global="true">
              <Constant Name="FALSE" Value="0"/>
              <Constant Name="TRUE" Value="1"/>
            </Enum>
          </Enums>
          <Commands>
            <Command Name="NOP" ID="0x0000"/>
            <Command Name="WAIT" ID="0x0001">
              <Args><Arg Type="INPUT_INT"/></Args>
            </Command>
            <Command Name="DO_FADE" ID="0x016A">
              <Args>
                <Arg Type="INPUT_INT"/>
                <Arg Type="INPUT_INT" Enum="FADE"/>
              </Args>
            </Command>
            <Command Name="CREATE_CAR" ID="0x00A5">
              <Args>
                <Arg Type="INPUT_INT" Enum="MODEL"/>
                <Arg Type="INPUT_FLOAT"/>
                <Arg Type="INPUT_FLOAT"/>
                <Arg Type="INPUT_FLOAT"/>
                <Arg Type="OUTPUT_INT" Entity="CAR"/>
              </Args>
            </Command>
            <Command Name="SET_VAR_INT" ID="0x0004">
              <Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args>
            </Command>
            <Command Name="OLD_ONE" ID="0x0123" Supported="false"/>
            <Command Name="ANDOR" ID="0x00D6" IsKeyword="true">
              <Args><Arg Type="INT"/></Args>
            </Command>
          </Commands>
          <Enums>
            <Enum Name="MODEL">
              <Constant Name="CELLPHONE" Value="258"/>
            </Enum>
          </Enums>
          <Alternators>
            <Alternator Name="SET">
              <Alternative Command="SET_VAR_INT"/>
            </Alternator>
          </Alternators>
        </GTA3Script>
    "#;

    #[test]
    fn loads_commands() {
        let db = load_commands_str(SAMPLE).unwrap();
        let (_, wait) = db.find_command("WAIT").unwrap();
        assert_eq!(wait.opcode, 0x0001);
        assert!(wait.supported);
        assert_eq!(wait.params.len(), 1);
        assert_eq!(wait.params[0].kind, ParamKind::InputInt);

        let (_, nop) = db.find_command("NOP").unwrap();
        assert!(nop.params.is_empty());

        let (_, old) = db.find_command("OLD_ONE").unwrap();
        assert!(!old.supported);

        let (_, andor) = db.find_command("ANDOR").unwrap();
        assert!(andor.is_keyword);
    }

    #[test]
    fn resolves_enum_refs_and_entities() {
        let db = load_commands_str(SAMPLE).unwrap();
        let fade = db.find_enum("FADE").unwrap();
        let (_, do_fade) = db.find_command("DO_FADE").unwrap();
        assert_eq!(do_fade.params[1].enum_ref, Some(fade));

        let (_, create_car) = db.find_command("CREATE_CAR").unwrap();
        let out = &create_car.params[4];
        assert!(out.out);
        let entity = out.entity.unwrap();
        assert_eq!(db.entity_name(entity), "CAR");
        assert_eq!(create_car.produced_entity(), Some(entity));

        assert_eq!(db.enum_def(db.model_enum().unwrap()).constant("CELLPHONE"), Some(258));
        assert_eq!(db.global_constant("TRUE"), Some((db.find_enum("BOOL").unwrap(), 1)));
        assert_eq!(db.global_constant("FADE_IN"), None);
    }

    #[test]
    fn alternator_targets_resolve() {
        let db = load_commands_str(SAMPLE).unwrap();
        let alt = db.find_alternator("SET").unwrap();
        assert_eq!(alt.commands.len(), 1);
        assert_eq!(db.command(alt.commands[0]).name, "SET_VAR_INT");
    }

    #[test]
    fn unknown_enum_is_an_error() {
        let bad = r#"<GTA3Script><Commands>
            <Command Name="X" ID="1"><Args><Arg Type="INT" Enum="NOPE"/></Args></Command>
        </Commands></GTA3Script>"#;
        assert!(load_commands_str(bad).is_err());
    }

    #[test]
    fn unknown_arg_type_is_an_error() {
        let bad = r#"<GTA3Script><Commands>
            <Command Name="X" ID="1"><Args><Arg Type="BANANA"/></Args></Command>
        </Commands></GTA3Script>"#;
        assert!(load_commands_str(bad).is_err());
    }
}
