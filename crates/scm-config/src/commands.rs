//! The command database: every engine command, alternator group and enum
//! known to the target game, plus type-driven alternator resolution.

use std::collections::HashMap;

use crate::options::Options;

pub type CommandId = usize;
pub type EnumId = usize;
pub type EntityId = usize;

/// Kinds of command parameter slots.
///
/// Immediate integer slots carry no width; the emitter picks the smallest
/// width that holds the value. `Input*`/`Output*` slots are polymorphic
/// over variable storage; the `Var*`/`LVar*` kinds demand one specific
/// storage class, which is what lets alternators tell `SET_VAR_INT` from
/// `SET_LVAR_INT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    VarInt,
    LVarInt,
    VarFloat,
    LVarFloat,
    VarTextLabel,
    LVarTextLabel,
    InputInt,
    InputFloat,
    OutputInt,
    OutputFloat,
    Label,
    TextLabel,
    String,
}

#[derive(Debug, Clone)]
pub struct ParamDesc {
    pub kind: ParamKind,
    pub enum_ref: Option<EnumId>,
    pub optional: bool,
    pub out: bool,
    pub entity: Option<EntityId>,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub opcode: u16,
    pub supported: bool,
    pub params: Vec<ParamDesc>,
    /// Internal commands (`ANDOR`, `GOTO_IF_FALSE`, ...) that source code
    /// may not invoke directly.
    pub is_keyword: bool,
}

impl Command {
    fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    /// Entity type produced by this command, from its first out param.
    pub fn produced_entity(&self) -> Option<EntityId> {
        self.params.iter().find(|p| p.out).and_then(|p| p.entity)
    }
}

/// A script-level name shared by several commands, disambiguated by the
/// argument types at each call site.
#[derive(Debug, Clone)]
pub struct Alternator {
    pub name: String,
    pub commands: Vec<CommandId>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    /// Global enums inject their constants into every scope.
    pub global: bool,
    pub constants: Vec<(String, i32)>,
}

impl EnumDef {
    pub fn constant(&self, name: &str) -> Option<i32> {
        self.constants.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }
}

/// The statically inferred type of an argument, used to pick an
/// alternative out of an alternator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Float,
    GlobalVarInt,
    LocalVarInt,
    GlobalVarFloat,
    LocalVarFloat,
    GlobalVarTextLabel,
    LocalVarTextLabel,
    TextLabel,
    String,
    Label,
    /// An enum constant; matches only slots bound to the same enum.
    Const(EnumId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    NoMatch,
    Ambiguous,
}

#[derive(Debug, Default)]
pub struct CommandDb {
    commands: Vec<Command>,
    by_name: HashMap<String, CommandId>,
    alternators: HashMap<String, Alternator>,
    enums: Vec<EnumDef>,
    enum_by_name: HashMap<String, EnumId>,
    entities: Vec<String>,
}

impl CommandDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(&mut self, command: Command) -> CommandId {
        let id = self.commands.len();
        self.by_name.insert(command.name.to_ascii_uppercase(), id);
        self.commands.push(command);
        id
    }

    pub fn add_alternator(&mut self, alternator: Alternator) {
        self.alternators.insert(alternator.name.to_ascii_uppercase(), alternator);
    }

    pub fn add_enum(&mut self, def: EnumDef) -> EnumId {
        let id = self.enums.len();
        self.enum_by_name.insert(def.name.to_ascii_uppercase(), id);
        self.enums.push(def);
        id
    }

    /// Interns an entity type name, returning its id.
    pub fn entity_id(&mut self, name: &str) -> EntityId {
        let upper = name.to_ascii_uppercase();
        if let Some(i) = self.entities.iter().position(|e| *e == upper) {
            return i;
        }
        self.entities.push(upper);
        self.entities.len() - 1
    }

    pub fn entity_name(&self, id: EntityId) -> &str {
        &self.entities[id]
    }

    pub fn command(&self, id: CommandId) -> &Command {
        &self.commands[id]
    }

    pub fn find_command(&self, name: &str) -> Option<(CommandId, &Command)> {
        let id = *self.by_name.get(&name.to_ascii_uppercase())?;
        Some((id, &self.commands[id]))
    }

    pub fn find_alternator(&self, name: &str) -> Option<&Alternator> {
        self.alternators.get(&name.to_ascii_uppercase())
    }

    pub fn find_enum(&self, name: &str) -> Option<EnumId> {
        self.enum_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id]
    }

    /// Looks `name` up across the global enums.
    pub fn global_constant(&self, name: &str) -> Option<(EnumId, i32)> {
        self.enums.iter().enumerate().find_map(|(id, e)| {
            if !e.global {
                return None;
            }
            e.constant(name).map(|v| (id, v))
        })
    }

    /// The enum model-typed slots fall back to the model registry through.
    pub fn model_enum(&self) -> Option<EnumId> {
        self.find_enum("MODEL")
    }

    /// Picks the single alternative whose parameter kinds match the
    /// argument types. Several candidates matching equally well is an
    /// ambiguity, never a silent first-declared pick.
    pub fn resolve_alternator(
        &self,
        alternator: &Alternator,
        arg_types: &[ArgType],
        opt: &Options,
    ) -> Result<CommandId, ResolveError> {
        let mut best: Vec<CommandId> = Vec::new();
        let mut best_score = 0u32;
        for &id in &alternator.commands {
            let command = &self.commands[id];
            if !command.supported {
                continue;
            }
            match self.match_score(command, arg_types, opt) {
                Some(score) if score > best_score => {
                    best_score = score;
                    best.clear();
                    best.push(id);
                }
                Some(score) if score == best_score => best.push(id),
                _ => {}
            }
        }
        match best.len() {
            0 => Err(ResolveError::NoMatch),
            1 => Ok(best[0]),
            _ => Err(ResolveError::Ambiguous),
        }
    }

    /// Score of a candidate against the argument list, or `None` when it
    /// does not match. Exact slot kinds score above polymorphic ones so a
    /// specific alternative beats a generic one without ambiguity.
    fn match_score(&self, command: &Command, arg_types: &[ArgType], opt: &Options) -> Option<u32> {
        if arg_types.len() < command.required_params() || arg_types.len() > command.params.len() {
            return None;
        }
        let mut score = 1;
        for (param, &arg) in command.params.iter().zip(arg_types) {
            score += param_specificity(param, arg, opt)? as u32;
        }
        Some(score)
    }
}

/// Compatibility of one argument with one slot: `None` if incompatible,
/// otherwise a specificity weight (2 exact, 1 polymorphic).
fn param_specificity(param: &ParamDesc, arg: ArgType, opt: &Options) -> Option<u8> {
    let enum_ok = |e: EnumId| param.enum_ref == Some(e);
    match (param.kind, arg) {
        (ParamKind::Int, ArgType::Int) => Some(2),
        (ParamKind::Int, ArgType::Const(e)) if enum_ok(e) || param.enum_ref.is_none() => Some(2),
        (ParamKind::Float, ArgType::Float) => Some(2),
        (ParamKind::VarInt, ArgType::GlobalVarInt) => Some(2),
        (ParamKind::LVarInt, ArgType::LocalVarInt) => Some(2),
        (ParamKind::VarFloat, ArgType::GlobalVarFloat) => Some(2),
        (ParamKind::LVarFloat, ArgType::LocalVarFloat) => Some(2),
        (ParamKind::VarTextLabel, ArgType::GlobalVarTextLabel) => Some(2),
        (ParamKind::LVarTextLabel, ArgType::LocalVarTextLabel) => Some(2),
        (ParamKind::InputInt, ArgType::Int) => Some(1),
        (ParamKind::InputInt, ArgType::Const(e)) if enum_ok(e) || param.enum_ref.is_none() => {
            Some(1)
        }
        (ParamKind::InputInt, ArgType::GlobalVarInt | ArgType::LocalVarInt) => Some(1),
        (ParamKind::InputFloat, ArgType::Float) => Some(1),
        (ParamKind::InputFloat, ArgType::GlobalVarFloat | ArgType::LocalVarFloat) => Some(1),
        (ParamKind::OutputInt, ArgType::GlobalVarInt | ArgType::LocalVarInt) => Some(1),
        (ParamKind::OutputFloat, ArgType::GlobalVarFloat | ArgType::LocalVarFloat) => Some(1),
        (ParamKind::Label, ArgType::Label) => Some(2),
        (ParamKind::TextLabel, ArgType::TextLabel) => Some(2),
        (ParamKind::TextLabel, ArgType::GlobalVarTextLabel | ArgType::LocalVarTextLabel)
            if opt.text_label_vars =>
        {
            Some(1)
        }
        (ParamKind::String, ArgType::String) => Some(2),
        _ => None,
    }
}
