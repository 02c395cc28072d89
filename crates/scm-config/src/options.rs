//! Compiler options. A plain record of typed fields; the CLI fills it in
//! from flags and per-game defaults.

use std::collections::HashMap;

/// Target game, which decides the command set and the `.scm` header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Game {
    Gta3,
    GtaVc,
    GtaSa,
}

impl Game {
    pub fn name(self) -> &'static str {
        match self {
            Game::Gta3 => "gta3",
            Game::GtaVc => "gtavc",
            Game::GtaSa => "gtasa",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub game: Game,

    // boolean flags
    pub headerless: bool,
    pub pedantic: bool,
    pub guesser: bool,
    pub use_half_float: bool,
    pub skip_single_ifs: bool,
    pub optimize_zero_floats: bool,
    pub entity_tracking: bool,
    pub script_name_check: bool,
    pub fswitch: bool,
    pub allow_break_continue: bool,
    pub scope_then_label: bool,
    pub farrays: bool,
    pub streamed_scripts: bool,
    pub text_label_vars: bool,
    pub use_local_offsets: bool,
    pub fsyntax_only: bool,
    pub emit_ir2: bool,
    pub relax_not: bool,

    /// CLEO output version; `Some` also forces headerless local-offset code.
    pub cleo: Option<u8>,

    /// Local slot where `TIMERA` lives (`TIMERB` is the next slot).
    pub timer_index: u32,
    /// Number of ordinary local variable slots per scope.
    pub local_var_limit: u32,
    /// First word index of the mission-variable region of the global space.
    /// Zero means missions allocate from the shared global counter.
    pub mission_var_begin: u32,
    pub mission_var_limit: Option<u32>,
    pub switch_case_limit: Option<u32>,
    pub array_elem_limit: Option<u32>,

    defines: HashMap<String, String>,
}

impl Options {
    /// Defaults for a target game.
    pub fn for_game(game: Game) -> Self {
        let (local_var_limit, timer_index) = match game {
            Game::Gta3 | Game::GtaVc => (16, 16),
            Game::GtaSa => (32, 32),
        };
        Self {
            game,
            headerless: false,
            pedantic: false,
            guesser: false,
            use_half_float: game == Game::Gta3,
            skip_single_ifs: false,
            optimize_zero_floats: false,
            entity_tracking: true,
            script_name_check: true,
            fswitch: false,
            allow_break_continue: false,
            scope_then_label: false,
            farrays: game == Game::GtaSa,
            streamed_scripts: false,
            text_label_vars: game == Game::GtaSa,
            use_local_offsets: game == Game::GtaSa,
            fsyntax_only: false,
            emit_ir2: false,
            relax_not: false,
            cleo: None,
            timer_index,
            local_var_limit,
            mission_var_begin: 0,
            mission_var_limit: match game {
                Game::Gta3 | Game::GtaVc => Some(256),
                Game::GtaSa => Some(1024),
            },
            switch_case_limit: Some(75),
            array_elem_limit: None,
            defines: HashMap::new(),
        }
    }

    pub fn define(&mut self, symbol: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(symbol.into().to_ascii_uppercase(), value.into());
    }

    pub fn undefine(&mut self, symbol: &str) {
        self.defines.remove(&symbol.to_ascii_uppercase());
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.defines.contains_key(&symbol.to_ascii_uppercase())
    }
}
