// SPDX-License-Identifier: MIT
//! Catalog of shared symbol tables, keyed by name and version
//!
//! The catalog is the one legitimately shared mutable structure in the
//! codec: many readers may resolve imports against it concurrently, so
//! access goes through a read-mostly lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::symtab::{SymbolTable, SymbolTableKind};

#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<String, BTreeMap<u32, Arc<SymbolTable>>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared table under its name and version
    pub fn put(&self, table: Arc<SymbolTable>) -> Result<()> {
        let (name, version) = match table.kind() {
            SymbolTableKind::Shared { name, version } => (name.clone(), *version),
            _ => {
                return Err(Error::SymbolTable(
                    "only locked shared tables belong in a catalog".into(),
                ))
            }
        };
        self.tables.write().entry(name).or_default().insert(version, table);
        Ok(())
    }

    /// Exact name and version match
    pub fn get_exact(&self, name: &str, version: u32) -> Option<Arc<SymbolTable>> {
        self.tables.read().get(name)?.get(&version).cloned()
    }

    /// The highest registered version of a name. Also the fallback when
    /// a requested version is absent.
    pub fn get(&self, name: &str) -> Option<Arc<SymbolTable>> {
        let tables = self.tables.read();
        let (_, table) = tables.get(name)?.last_key_value()?;
        Some(Arc::clone(table))
    }

    /// Exact version if present, else the best (highest) available
    pub fn resolve(&self, name: &str, version: Option<u32>) -> Option<Arc<SymbolTable>> {
        match version {
            Some(version) => self.get_exact(name, version).or_else(|| self.get(name)),
            None => self.get(name),
        }
    }
}
