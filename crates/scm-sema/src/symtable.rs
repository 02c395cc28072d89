//! Symbol tables: variables, labels and their index spaces.
//!
//! Global variables of the main script and its subscripts live in one
//! shared index space and must agree across jobs, so they are collected
//! sequentially before analysis starts ([`collect_globals`]). Everything
//! else (locals, mission variables, labels) is owned by one job.

use std::collections::HashMap;
use std::sync::Arc;

use scm_config::commands::EntityId;
use scm_config::Options;
use scm_syntax::ast::{Stmt, VarClass, VarType};
use scm_syntax::diag::{DiagContext, Diagnostics};
use scm_syntax::source::{Loc, SourceFile};
use scm_syntax::ScriptKind;

/// Storage class of a resolved variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Global,
    Local,
    /// Allocated in the mission-variable region of the global space.
    Mission,
}

/// A resolved variable. Immutable once created; entity-type tracking
/// lives in the per-job [`SymbolTable`], keyed by [`Var::id`].
#[derive(Debug)]
pub struct Var {
    pub id: u32,
    pub name: String,
    pub scope: VarScope,
    pub ty: VarType,
    /// Word offset within the variable storage (globals/mission) or the
    /// local slot number.
    pub index: u32,
    pub array_len: Option<u32>,
}

impl Var {
    /// Words of storage this variable occupies. Text labels take 8 bytes.
    fn word_size(ty: VarType, array_len: Option<u32>) -> u32 {
        let per_elem = if ty == VarType::TextLabel { 2 } else { 1 };
        per_elem * array_len.unwrap_or(1)
    }

    pub fn uses_global_storage(&self) -> bool {
        matches!(self.scope, VarScope::Global | VarScope::Mission)
    }
}

/// The shared global variable scope, built before jobs run.
#[derive(Debug, Default)]
pub struct GlobalScope {
    vars: HashMap<String, Arc<Var>>,
    next_index: u32,
    next_id: u32,
}

impl GlobalScope {
    pub fn lookup(&self, name: &str) -> Option<&Arc<Var>> {
        self.vars.get(name)
    }

    /// Words of global storage used, including the mission region when
    /// one is configured.
    pub fn storage_words(&self, opt: &Options) -> u32 {
        let mission_end = if opt.mission_var_begin > 0 {
            opt.mission_var_begin + opt.mission_var_limit.unwrap_or(0)
        } else {
            0
        };
        self.next_index.max(mission_end)
    }

    /// First id free for per-job variables.
    pub fn id_watermark(&self) -> u32 {
        self.next_id
    }

    /// First word index free past the collected globals.
    pub fn next_free_index(&self) -> u32 {
        self.next_index
    }

    fn declare(
        &mut self,
        name: &str,
        ty: VarType,
        array_len: Option<u32>,
        scope: VarScope,
    ) -> Option<Arc<Var>> {
        if self.vars.contains_key(name) {
            return None;
        }
        let var = Arc::new(Var {
            id: self.next_id,
            name: name.to_string(),
            scope,
            ty,
            index: self.next_index,
            array_len,
        });
        self.next_id += 1;
        self.next_index += Var::word_size(ty, array_len);
        self.vars.insert(name.to_string(), Arc::clone(&var));
        Some(var)
    }
}

/// Collects every global variable declaration of the main script and the
/// subscripts, in driver order, into one shared scope. Mission scripts
/// are skipped when a mission-variable region is configured; their
/// globals then allocate per job from that region.
pub fn collect_globals(
    scripts: &[(ScriptKind, Arc<SourceFile>, &[Stmt])],
    opt: &Options,
    diag: &Diagnostics,
) -> GlobalScope {
    let mut scope = GlobalScope::default();
    for (kind, file, stmts) in scripts {
        if kind.is_mission_like() && opt.mission_var_begin > 0 {
            continue;
        }
        collect_globals_in(&mut scope, file, stmts, opt, diag);
    }
    scope
}

fn collect_globals_in(
    scope: &mut GlobalScope,
    file: &Arc<SourceFile>,
    stmts: &[Stmt],
    opt: &Options,
    diag: &Diagnostics,
) {
    for stmt in stmts {
        match stmt {
            Stmt::VarDecl(decl) if decl.class == VarClass::Global => {
                for name in &decl.names {
                    if scope.declare(&name.name, decl.ty, name.array_len, VarScope::Global).is_none()
                    {
                        diag.error(
                            &source_context(file, name.loc),
                            &format!("global variable '{}' redeclared", name.name),
                        );
                    }
                }
                if opt.mission_var_begin > 0 && scope.next_index > opt.mission_var_begin {
                    diag.error(
                        &source_context(file, decl.loc),
                        "global variables overflow into the mission variable region",
                    );
                }
            }
            Stmt::If { then_body, else_body, .. } => {
                collect_globals_in(scope, file, then_body, opt, diag);
                if let Some(body) = else_body {
                    collect_globals_in(scope, file, body, opt, diag);
                }
            }
            Stmt::While { body, .. } | Stmt::Repeat { body, .. } | Stmt::Scope { body, .. } => {
                collect_globals_in(scope, file, body, opt, diag);
            }
            Stmt::Switch { cases, default, .. } => {
                for case in cases {
                    collect_globals_in(scope, file, &case.body, opt, diag);
                }
                if let Some(body) = default {
                    collect_globals_in(scope, file, body, opt, diag);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn source_context(file: &Arc<SourceFile>, loc: Loc) -> DiagContext {
    DiagContext::Source {
        file: file.path.clone(),
        loc,
        line_text: file.line(loc.line).unwrap_or("").to_string(),
    }
}

/// A label definition with the lexical scope path it lives in. With
/// `scope_then_label` a label in an inner scope may shadow an outer one;
/// otherwise all labels share the script-wide path.
struct LabelDef {
    name: String,
    path: Vec<u32>,
}

struct LocalFrame {
    vars: HashMap<String, Arc<Var>>,
    saved_next: u32,
}

/// Per-job symbol table.
pub struct SymbolTable<'a> {
    globals: &'a GlobalScope,
    opt: &'a Options,
    kind: ScriptKind,

    mission_vars: HashMap<String, Arc<Var>>,
    mission_next: u32,

    guessed: HashMap<String, Arc<Var>>,
    guessed_next: u32,

    frames: Vec<LocalFrame>,
    local_next: u32,
    timers: [Option<Arc<Var>>; 2],

    labels: Vec<LabelDef>,
    next_id: u32,
    entities: HashMap<u32, EntityId>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(globals: &'a GlobalScope, opt: &'a Options, kind: ScriptKind) -> Self {
        Self {
            globals,
            opt,
            kind,
            mission_vars: HashMap::new(),
            mission_next: opt.mission_var_begin,
            guessed: HashMap::new(),
            guessed_next: globals.next_free_index(),
            frames: vec![LocalFrame { vars: HashMap::new(), saved_next: 0 }],
            local_next: 0,
            timers: [None, None],
            labels: Vec::new(),
            next_id: globals.id_watermark(),
            entities: HashMap::new(),
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- variables ----

    pub fn lookup_var(&self, name: &str) -> Option<Arc<Var>> {
        for frame in self.frames.iter().rev() {
            if let Some(var) = frame.vars.get(name) {
                return Some(Arc::clone(var));
            }
        }
        if let Some(var) = self.mission_vars.get(name) {
            return Some(Arc::clone(var));
        }
        if let Some(var) = self.guessed.get(name) {
            return Some(Arc::clone(var));
        }
        if let Some(var) = self.globals.lookup(name) {
            return Some(Arc::clone(var));
        }
        match name {
            "TIMERA" => self.timer(0),
            "TIMERB" => self.timer(1),
            _ => None,
        }
    }

    fn timer(&self, which: usize) -> Option<Arc<Var>> {
        self.timers[which].as_ref().map(Arc::clone)
    }

    /// Creates the predefined timer variables. Called once at job start.
    pub fn install_timers(&mut self) {
        for which in 0..2usize {
            let var = Arc::new(Var {
                id: self.fresh_id(),
                name: if which == 0 { "TIMERA" } else { "TIMERB" }.into(),
                scope: VarScope::Local,
                ty: VarType::Int,
                index: self.opt.timer_index + which as u32,
                array_len: None,
            });
            self.timers[which] = Some(var);
        }
    }

    /// Declares a local variable in the innermost scope. `None` when the
    /// name is taken in that scope or the slots are exhausted.
    pub fn declare_local(
        &mut self,
        name: &str,
        ty: VarType,
        array_len: Option<u32>,
    ) -> Result<Arc<Var>, &'static str> {
        let frame = self.frames.last_mut().expect("scope stack never empty");
        if frame.vars.contains_key(name) {
            return Err("variable redeclared in this scope");
        }
        let words = Var::word_size(ty, array_len);
        if self.local_next + words > self.opt.local_var_limit {
            return Err("too many local variables in scope");
        }
        let var = Arc::new(Var {
            id: self.next_id,
            name: name.to_string(),
            scope: VarScope::Local,
            ty,
            index: self.local_next,
            array_len,
        });
        self.next_id += 1;
        self.local_next += words;
        frame.vars.insert(name.to_string(), Arc::clone(&var));
        Ok(var)
    }

    /// Declares a global-class variable from inside a mission script,
    /// allocating from the mission-variable region when one is
    /// configured.
    pub fn declare_mission_var(
        &mut self,
        name: &str,
        ty: VarType,
        array_len: Option<u32>,
    ) -> Result<Arc<Var>, String> {
        if self.mission_vars.contains_key(name) || self.globals.lookup(name).is_some() {
            return Err(format!("variable '{name}' redeclared"));
        }
        let words = Var::word_size(ty, array_len);
        if let Some(limit) = self.opt.mission_var_limit {
            if self.mission_next + words > self.opt.mission_var_begin + limit {
                return Err("too many mission variables".into());
            }
        }
        let var = Arc::new(Var {
            id: self.fresh_id(),
            name: name.to_string(),
            scope: VarScope::Mission,
            ty,
            index: self.mission_next,
            array_len,
        });
        self.mission_next += words;
        self.mission_vars.insert(name.to_string(), Arc::clone(&var));
        Ok(var)
    }

    /// Whether this job allocates its global-class declarations itself
    /// (mission scripts with a configured mission-variable region).
    pub fn owns_global_decls(&self) -> bool {
        self.kind.is_mission_like() && self.opt.mission_var_begin > 0
    }

    /// Declares a variable inferred from its first use (`--guesser`).
    /// Mission scripts route the guess to the mission region; otherwise
    /// it allocates past the collected globals.
    pub fn guess_var(&mut self, name: &str, ty: VarType) -> Result<Arc<Var>, String> {
        if self.owns_global_decls() {
            return self.declare_mission_var(name, ty, None);
        }
        let var = Arc::new(Var {
            id: self.fresh_id(),
            name: name.to_string(),
            scope: VarScope::Global,
            ty,
            index: self.guessed_next,
            array_len: None,
        });
        self.guessed_next += Var::word_size(ty, None);
        self.guessed.insert(name.to_string(), Arc::clone(&var));
        Ok(var)
    }

    pub fn push_scope(&mut self) {
        self.frames.push(LocalFrame { vars: HashMap::new(), saved_next: self.local_next });
    }

    pub fn pop_scope(&mut self) {
        let frame = self.frames.pop().expect("scope stack never empty");
        // slots of dead locals are reused; drop their entity tracking too
        for var in frame.vars.values() {
            self.entities.remove(&var.id);
        }
        self.local_next = frame.saved_next;
    }

    // ---- entity tracking ----

    pub fn entity_of(&self, var: &Var) -> Option<EntityId> {
        self.entities.get(&var.id).copied()
    }

    pub fn set_entity(&mut self, var: &Var, entity: EntityId) {
        self.entities.insert(var.id, entity);
    }

    // ---- labels ----

    /// Declares a label at the given lexical scope path (pre-pass).
    /// `None` on duplicates within the same path.
    pub fn declare_label(&mut self, name: &str, path: &[u32]) -> Option<u32> {
        let shadowing_allowed = self.opt.scope_then_label;
        let clash = self.labels.iter().any(|def| {
            def.name == name && (def.path == path || !shadowing_allowed)
        });
        if clash {
            return None;
        }
        let id = self.labels.len() as u32;
        self.labels.push(LabelDef { name: name.to_string(), path: path.to_vec() });
        Some(id)
    }

    /// Resolves a label reference from the given scope path, innermost
    /// match first.
    pub fn lookup_label(&self, name: &str, path: &[u32]) -> Option<u32> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, def)| def.name == name && path.starts_with(&def.path))
            .max_by_key(|(_, def)| def.path.len())
            .map(|(id, _)| id as u32)
    }

    pub fn label_count(&self) -> u32 {
        self.labels.len() as u32
    }

    /// Highest word index this job allocated in the global space
    /// (guessed variables and mission variables included).
    pub fn storage_watermark(&self) -> u32 {
        self.guessed_next.max(self.mission_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_config::Game;

    fn opts() -> Options {
        Options::for_game(Game::GtaSa)
    }

    #[test]
    fn global_allocation_is_sequential() {
        let mut scope = GlobalScope::default();
        let a = scope.declare("A", VarType::Int, None, VarScope::Global).unwrap();
        let b = scope.declare("B", VarType::Float, None, VarScope::Global).unwrap();
        let c = scope.declare("C", VarType::TextLabel, None, VarScope::Global).unwrap();
        let d = scope.declare("D", VarType::Int, Some(10), VarScope::Global).unwrap();
        let e = scope.declare("E", VarType::Int, None, VarScope::Global).unwrap();
        assert_eq!((a.index, b.index, c.index, d.index, e.index), (0, 1, 2, 4, 14));
        assert!(scope.declare("A", VarType::Int, None, VarScope::Global).is_none());
    }

    #[test]
    fn local_slots_are_reused_across_sibling_scopes() {
        let globals = GlobalScope::default();
        let opt = opts();
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        table.push_scope();
        let x = table.declare_local("X", VarType::Int, None).unwrap();
        assert_eq!(x.index, 0);
        table.pop_scope();
        table.push_scope();
        let y = table.declare_local("Y", VarType::Float, None).unwrap();
        assert_eq!(y.index, 0);
        table.pop_scope();
    }

    #[test]
    fn local_limit_is_enforced() {
        let globals = GlobalScope::default();
        let mut opt = opts();
        opt.local_var_limit = 2;
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        table.declare_local("A", VarType::Int, None).unwrap();
        table.declare_local("B", VarType::Int, None).unwrap();
        assert!(table.declare_local("C", VarType::Int, None).is_err());
    }

    #[test]
    fn timers_resolve() {
        let globals = GlobalScope::default();
        let opt = opts();
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        table.install_timers();
        let a = table.lookup_var("TIMERA").unwrap();
        let b = table.lookup_var("TIMERB").unwrap();
        assert_eq!(a.index, opt.timer_index);
        assert_eq!(b.index, opt.timer_index + 1);
    }

    #[test]
    fn mission_vars_allocate_from_their_region() {
        let globals = GlobalScope::default();
        let mut opt = opts();
        opt.mission_var_begin = 100;
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Mission);
        assert!(table.owns_global_decls());
        let v = table.declare_mission_var("M", VarType::Int, None).unwrap();
        assert_eq!(v.index, 100);
        assert_eq!(v.scope, VarScope::Mission);
    }

    #[test]
    fn scoped_labels_shadow_only_with_option() {
        let globals = GlobalScope::default();
        let mut opt = opts();

        opt.scope_then_label = false;
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        assert!(table.declare_label("L", &[]).is_some());
        assert!(table.declare_label("L", &[0]).is_none());

        opt.scope_then_label = true;
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        let outer = table.declare_label("L", &[]).unwrap();
        let inner = table.declare_label("L", &[0]).unwrap();
        assert_eq!(table.lookup_label("L", &[0]), Some(inner));
        assert_eq!(table.lookup_label("L", &[1]), Some(outer));
        assert_eq!(table.lookup_label("L", &[]), Some(outer));
    }

    #[test]
    fn entity_tracking_is_dropped_with_its_scope() {
        let globals = GlobalScope::default();
        let opt = opts();
        let mut table = SymbolTable::new(&globals, &opt, ScriptKind::Main);
        table.push_scope();
        let car = table.declare_local("CAR", VarType::Int, None).unwrap();
        table.set_entity(&car, 3);
        assert_eq!(table.entity_of(&car), Some(3));
        table.pop_scope();
        assert_eq!(table.entity_of(&car), None);
    }
}
