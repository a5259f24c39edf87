// SPDX-License-Identifier: MIT
//! Symbol tables: the name/ID bijection shared by reader and writer
//!
//! A table's ID space is partitioned into contiguous ranges in a fixed
//! order: the system range, one range per import (in import order), and
//! the local range on top. `max_id` is the upper bound of the highest
//! range currently defined.
//!
//! A table is either locked (system or shared, immutable, importable)
//! or an unlocked local table that may still grow. The role is a tagged
//! variant rather than a flag so "is this the system table" is never a
//! string comparison.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::format::{RESERVED_PREFIX, SYSTEM_SYMBOLS};

/// The role a symbol table plays in a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolTableKind {
    /// The process-wide table of well-known symbols; built once, never
    /// mutated
    System,
    /// A named, versioned, locked table usable across streams through a
    /// catalog
    Shared { name: String, version: u32 },
    /// The per-stream mutable segment layered on system and imports
    Local,
}

/// An import reference as it appears in a serialized symbol table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub name: String,
    pub version: u32,
    pub max_id: u32,
}

#[derive(Debug, Clone)]
struct TableImport {
    table: Arc<SymbolTable>,
    /// Highest sid of the range below this import
    base_sid: u32,
    /// How many of the shared table's non-system symbols are visible
    symbol_count: u32,
    /// The max_id value to serialize, in the shared table's own space
    declared_max_id: u32,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    kind: SymbolTableKind,
    system: Option<Arc<SymbolTable>>,
    imports: Vec<TableImport>,
    /// Local symbols; index i holds sid `local_base + 1 + i`. Gaps stay
    /// `None` when symbols were defined with explicit, non-contiguous
    /// ids.
    locals: Vec<Option<String>>,
    name_to_sid: HashMap<String, u32>,
    local_base: u32,
    max_id: u32,
}

static SYSTEM_TABLE: Lazy<Arc<SymbolTable>> = Lazy::new(|| {
    let mut locals = Vec::with_capacity(SYSTEM_SYMBOLS.len());
    let mut name_to_sid = HashMap::with_capacity(SYSTEM_SYMBOLS.len());
    for (index, name) in SYSTEM_SYMBOLS.iter().enumerate() {
        locals.push(Some((*name).to_string()));
        name_to_sid.insert((*name).to_string(), index as u32 + 1);
    }
    Arc::new(SymbolTable {
        kind: SymbolTableKind::System,
        system: None,
        imports: Vec::new(),
        locals,
        name_to_sid,
        local_base: 0,
        max_id: SYSTEM_SYMBOLS.len() as u32,
    })
});

/// The shared, immutable system symbol table
pub fn system_table() -> &'static Arc<SymbolTable> {
    &SYSTEM_TABLE
}

impl SymbolTable {
    /// A fresh unlocked local table layered on the system table
    pub fn new_local() -> Self {
        let system = Arc::clone(system_table());
        let max_id = system.max_id;
        Self {
            kind: SymbolTableKind::Local,
            system: Some(system),
            imports: Vec::new(),
            locals: Vec::new(),
            name_to_sid: HashMap::new(),
            local_base: max_id,
            max_id,
        }
    }

    /// Build a locked shared table from a symbol list
    pub fn new_shared<'a, I>(name: &str, version: u32, symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = Self::new_local();
        for symbol in symbols {
            table.add(symbol)?;
        }
        table.lock(name, version)?;
        Ok(table)
    }

    pub fn kind(&self) -> &SymbolTableKind {
        &self.kind
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self.kind, SymbolTableKind::Local)
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Highest sid of the system range at the bottom of this table
    pub fn system_max_id(&self) -> u32 {
        match &self.system {
            Some(system) => system.max_id,
            None => 0,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            SymbolTableKind::Shared { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<u32> {
        match &self.kind {
            SymbolTableKind::Shared { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// Lock a local table into a shared table. The only valid role
    /// transition; system tables are born locked.
    pub fn lock(&mut self, name: &str, version: u32) -> Result<()> {
        if self.is_locked() {
            return Err(Error::SymbolTable("table is already locked".into()));
        }
        if name.is_empty() {
            return Err(Error::SymbolTable("a shared table needs a non-empty name".into()));
        }
        if version < 1 {
            return Err(Error::SymbolTable("a shared table needs a version of 1 or more".into()));
        }
        self.kind = SymbolTableKind::Shared { name: name.to_string(), version };
        Ok(())
    }

    /// Add a symbol, returning its existing id when the name is already
    /// visible anywhere in the table's id space
    pub fn add(&mut self, name: &str) -> Result<u32> {
        if self.is_locked() {
            return Err(Error::SymbolTable("cannot add symbols to a locked table".into()));
        }
        if name.is_empty() {
            return Err(Error::SymbolTable("symbol names must not be empty".into()));
        }
        if let Some(sid) = self.find_by_name(name)? {
            return Ok(sid);
        }
        let sid = self.max_id + 1;
        self.locals.push(Some(name.to_string()));
        self.name_to_sid.insert(name.to_string(), sid);
        self.max_id = sid;
        Ok(sid)
    }

    /// Place a symbol at an explicit id, as an embedded symbol table
    /// struct does. Re-defining the same binding is a no-op; moving a
    /// name or re-using an id is an error.
    pub fn define(&mut self, name: &str, sid: u32) -> Result<()> {
        if self.is_locked() {
            return Err(Error::SymbolTable("cannot define symbols in a locked table".into()));
        }
        if name.is_empty() || sid == 0 {
            return Err(Error::SymbolTable("symbol definitions need a name and a positive id".into()));
        }
        if let Some(existing) = self.find_by_name(name)? {
            if existing != sid {
                return Err(Error::SymbolTable(format!(
                    "symbol '{name}' is already bound to id {existing}"
                )));
            }
            return Ok(());
        }
        if sid <= self.local_base {
            return Err(Error::SymbolTable(format!(
                "id {sid} falls in the system or import range"
            )));
        }
        if let Some(existing) = self.find_by_id(sid) {
            return Err(Error::SymbolTable(format!(
                "id {sid} is already bound to '{existing}'"
            )));
        }
        let index = (sid - self.local_base - 1) as usize;
        if index >= self.locals.len() {
            self.locals.resize(index + 1, None);
        }
        self.locals[index] = Some(name.to_string());
        self.name_to_sid.insert(name.to_string(), sid);
        if sid > self.max_id {
            self.max_id = sid;
        }
        Ok(())
    }

    /// Import every non-system symbol of a locked shared table
    pub fn import(&mut self, table: Arc<SymbolTable>) -> Result<()> {
        self.import_with_max_id(table, 0)
    }

    /// Import a shared table, keeping only symbols up to
    /// `declared_max_id` in the shared table's own id space (0 imports
    /// everything). Imported symbols are renumbered so the shared
    /// table's system range is never re-exposed.
    pub fn import_with_max_id(&mut self, table: Arc<SymbolTable>, declared_max_id: u32) -> Result<()> {
        if self.is_locked() {
            return Err(Error::SymbolTable("cannot import into a locked table".into()));
        }
        if !self.locals.is_empty() {
            return Err(Error::SymbolTable(
                "imports must be added before any local symbols".into(),
            ));
        }
        let (name, _version) = match &table.kind {
            SymbolTableKind::Shared { name, version } => (name.clone(), *version),
            SymbolTableKind::System => {
                return Err(Error::SymbolTable("the system table is implicit, not importable".into()))
            }
            SymbolTableKind::Local => {
                return Err(Error::SymbolTable("only locked shared tables can be imported".into()))
            }
        };
        if self.imports.iter().any(|import| import.table.name() == Some(name.as_str())) {
            return Err(Error::SymbolTable(format!("table '{name}' is already imported")));
        }

        // the declared range is allocated even when the resolved table
        // is smaller; ids past its end stay unknown rather than
        // shifting every later range
        let declared = if declared_max_id > 0 { declared_max_id } else { table.max_id };
        let symbol_count = declared.saturating_sub(table.system_max_id());

        self.imports.push(TableImport {
            base_sid: self.max_id,
            symbol_count,
            declared_max_id: declared,
            table,
        });
        self.max_id += symbol_count;
        self.local_base = self.max_id;
        Ok(())
    }

    /// Look a name up through system, imports (in order), then locals.
    ///
    /// A name of the form `$<digits>` with no binding resolves to that
    /// id directly; other unbound names under the reserved `$ion_`
    /// prefix are an error.
    pub fn find_by_name(&self, name: &str) -> Result<Option<u32>> {
        if let Some(system) = &self.system {
            if let Some(&sid) = system.name_to_sid.get(name) {
                return Ok(Some(sid));
            }
        }
        for import in &self.imports {
            if let Some(inner) = import.table.find_above_system(name) {
                let offset = inner - import.table.system_max_id();
                if offset <= import.symbol_count {
                    return Ok(Some(import.base_sid + offset));
                }
            }
        }
        if let Some(&sid) = self.name_to_sid.get(name) {
            return Ok(Some(sid));
        }
        if let Some(digits) = name.strip_prefix('$') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(sid) = digits.parse::<u32>() {
                    if sid > 0 {
                        return Ok(Some(sid));
                    }
                }
            } else if name.starts_with(RESERVED_PREFIX) {
                return Err(Error::SymbolTable(format!(
                    "'{name}' is in the reserved system namespace"
                )));
            }
        }
        Ok(None)
    }

    /// Name lookup above the system range, for import remapping
    fn find_above_system(&self, name: &str) -> Option<u32> {
        for import in &self.imports {
            if let Some(inner) = import.table.find_above_system(name) {
                let offset = inner - import.table.system_max_id();
                if offset <= import.symbol_count {
                    return Some(import.base_sid + offset);
                }
            }
        }
        self.name_to_sid.get(name).copied()
    }

    /// Direct range lookup of an id
    pub fn find_by_id(&self, sid: u32) -> Option<&str> {
        if sid == 0 || sid > self.max_id {
            return None;
        }
        if let Some(system) = &self.system {
            if sid <= system.max_id {
                return system.find_by_id(sid);
            }
        }
        for import in &self.imports {
            if sid <= import.base_sid + import.symbol_count {
                let inner = sid - import.base_sid + import.table.system_max_id();
                return import.table.find_by_id(inner);
            }
        }
        let index = (sid - self.local_base).checked_sub(1)? as usize;
        self.locals.get(index)?.as_deref()
    }

    /// Locally defined symbols in id order, gaps skipped
    pub fn local_symbols(&self) -> impl Iterator<Item = (u32, &str)> {
        let base = self.local_base;
        self.locals
            .iter()
            .enumerate()
            .filter_map(move |(index, name)| {
                name.as_deref().map(|name| (base + 1 + index as u32, name))
            })
    }

    pub fn has_local_symbols(&self) -> bool {
        self.locals.iter().any(|name| name.is_some())
    }

    /// Import references in import order, as they serialize
    pub fn import_records(&self) -> Vec<ImportRecord> {
        self.imports
            .iter()
            .map(|import| ImportRecord {
                name: import.table.name().unwrap_or_default().to_string(),
                version: import.table.version().unwrap_or(1),
                max_id: import.declared_max_id,
            })
            .collect()
    }
}
