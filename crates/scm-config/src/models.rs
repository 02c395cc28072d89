//! Model name registry, fed from IDE and level DAT files.
//!
//! IDE files declare object models in `objs`/`tobj` sections as
//! comma-delimited records (`id, modelname, txd, ...`). A level DAT file
//! lists `IDE <path>` lines to load. Model names are case-insensitive.

use std::fs;
use std::path::Path;

use crate::xml::ConfigError;

#[derive(Debug, Default)]
pub struct ModelRegistry {
    default_models: Vec<(String, u32)>,
    level_models: Vec<(String, u32)>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model id for `name`, along with whether it came from a level IDE
    /// (as opposed to the default one).
    pub fn find(&self, name: &str) -> Option<(u32, bool)> {
        let upper = name.to_ascii_uppercase();
        if let Some(&(_, id)) = self.level_models.iter().find(|(n, _)| *n == upper) {
            return Some((id, true));
        }
        self.default_models.iter().find(|(n, _)| *n == upper).map(|&(_, id)| (id, false))
    }

    pub fn is_model_from_ide(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn insert(&mut self, name: String, id: u32, is_default: bool) {
        let list = if is_default { &mut self.default_models } else { &mut self.level_models };
        if !list.iter().any(|(n, _)| *n == name) {
            list.push((name, id));
        }
    }
}

/// Loads one IDE file into the registry.
pub fn load_ide(path: &Path, is_default: bool, registry: &mut ModelRegistry) -> Result<(), ConfigError> {
    let text = fs::read_to_string(path)?;
    parse_ide(&text, is_default, registry);
    Ok(())
}

/// Parses IDE text already in memory.
pub fn load_ide_str(text: &str, is_default: bool, registry: &mut ModelRegistry) {
    parse_ide(text, is_default, registry);
}

/// Loads a level DAT file: every `IDE <path>` line names an IDE file,
/// resolved relative to the DAT's directory.
pub fn load_dat(path: &Path, is_default: bool, registry: &mut ModelRegistry) -> Result<(), ConfigError> {
    let text = fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for line in text.lines() {
        let line = strip_comment(line).trim();
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some(kind) if kind.eq_ignore_ascii_case("IDE") => {
                let rel = fields.next().ok_or_else(|| {
                    ConfigError::Parse(format!("{}: IDE line missing path", path.display()))
                })?;
                load_ide(&base.join(rel.replace('\\', "/")), is_default, registry)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_ide(text: &str, is_default: bool, registry: &mut ModelRegistry) {
    let mut in_section = false;
    for line in text.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        if !in_section {
            if line.eq_ignore_ascii_case("objs") || line.eq_ignore_ascii_case("tobj") {
                in_section = true;
            }
            continue;
        }
        if line.eq_ignore_ascii_case("end") {
            in_section = false;
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let id = fields.next().and_then(|f| f.parse::<u32>().ok());
        let name = fields.next();
        if let (Some(id), Some(name)) = (id, name) {
            registry.insert(name.to_ascii_uppercase(), id, is_default);
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}
