// SPDX-License-Identifier: MIT
//! Pull-style binary reader: a stack-based cursor over length-prefixed
//! nested values with inline symbol-table recognition
//!
//! The cursor moves through three states per value: before the type
//! descriptor, after it (`has_next` found a value), and before the
//! contents (`next` committed to it). Stepping into a container pushes
//! the enclosing position, context and symbol table so `step_out` can
//! reposition without rescanning.
//!
//! At the positions where the format allows a symbol table (top level
//! and s-expression members), the reader silently consumes version
//! markers and `$ion_symbol_table` structs, installing the new table
//! before scanning on; callers only ever see real values.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::format::{
    length_code, split_descriptor, system_sid, type_code, IonType, VERSION_MARKER,
};
use crate::symtab::{self, SymbolTable};
use crate::types::{Decimal, Timestamp};
use crate::varint::ByteCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeTypeDescriptor,
    AfterTypeDescriptor,
    BeforeContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerContext {
    TopLevel,
    List,
    Sexp,
    Struct,
}

/// Whether the current position may legally hold an embedded symbol
/// table or version marker. Kept as explicit protocol state, set only
/// at construction and step boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymtabRecognition {
    Active,
    Inactive,
}

#[derive(Debug, Clone)]
struct Frame {
    next_position: usize,
    context: ContainerContext,
    recognition: SymtabRecognition,
    local_end: usize,
    symbols: Arc<SymbolTable>,
}

pub struct BinaryReader<'a> {
    cursor: ByteCursor<'a>,
    symbols: Arc<SymbolTable>,
    catalog: Option<Arc<Catalog>>,
    state: CursorState,
    context: ContainerContext,
    recognition: SymtabRecognition,
    local_end: usize,
    eof: bool,
    poisoned: bool,
    value_tid: u8,
    value_type: IonType,
    value_len: usize,
    field_sid: Option<u32>,
    annotation_start: Option<usize>,
    stack: Vec<Frame>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(buf),
            symbols: Arc::clone(symtab::system_table()),
            catalog: None,
            state: CursorState::BeforeTypeDescriptor,
            context: ContainerContext::TopLevel,
            recognition: SymtabRecognition::Active,
            local_end: buf.len(),
            eof: false,
            poisoned: false,
            value_tid: 0,
            value_type: IonType::Null,
            value_len: 0,
            field_sid: None,
            annotation_start: None,
            stack: Vec::new(),
        }
    }

    /// Resolve embedded import declarations against a shared catalog
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The symbol table currently in effect
    pub fn symbol_table(&self) -> Arc<SymbolTable> {
        Arc::clone(&self.symbols)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_in_struct(&self) -> bool {
        self.context == ContainerContext::Struct
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::InvalidState("reader is unusable after malformed data"));
        }
        Ok(())
    }

    /// Record that the buffer can no longer be trusted
    fn poison<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::MalformedBinary { .. }) | Err(Error::Overflow(_))) {
            self.poisoned = true;
        }
        result
    }

    /// Look ahead for the next value, transparently absorbing version
    /// markers and symbol-table structs where the format allows them
    pub fn has_next(&mut self) -> Result<bool> {
        self.check_usable()?;
        let result = self.scan_next();
        self.poison(result)
    }

    fn scan_next(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.state == CursorState::AfterTypeDescriptor {
            return Ok(true);
        }
        if self.state == CursorState::BeforeContents {
            // the caller never materialized the value; skip it
            self.cursor.skip(self.value_len)?;
            self.state = CursorState::BeforeTypeDescriptor;
        }

        loop {
            if self.cursor.position() >= self.local_end {
                self.eof = true;
                return Ok(false);
            }

            if self.recognition == SymtabRecognition::Active
                && self.cursor.peek_bytes(4) == Some(VERSION_MARKER.as_slice())
            {
                self.cursor.skip(4)?;
                self.symbols = Arc::clone(symtab::system_table());
                trace!("version marker reset the symbol table");
                continue;
            }

            self.field_sid = if self.context == ContainerContext::Struct {
                Some(self.cursor.read_var_uint32()?)
            } else {
                None
            };

            let td = self.cursor.read_u8()?;
            let (code, _) = split_descriptor(td);
            if self.recognition == SymtabRecognition::Active
                && code == type_code::ANNOTATION
                && self.try_absorb_symbol_table(td)?
            {
                continue;
            }

            self.value_tid = td;
            self.state = CursorState::AfterTypeDescriptor;
            return Ok(true);
        }
    }

    /// Commit to the value found by `has_next`, unwrapping annotations
    /// and decoding the content length
    pub fn next(&mut self) -> Result<IonType> {
        self.check_usable()?;
        if self.state == CursorState::BeforeTypeDescriptor
            || self.state == CursorState::BeforeContents
        {
            if !self.has_next()? {
                return Err(Error::InvalidState("no more values in this container"));
            }
        }
        let result = self.commit_next();
        self.poison(result)
    }

    fn commit_next(&mut self) -> Result<IonType> {
        let mut td = self.value_tid;
        let (mut code, mut nibble) = split_descriptor(td);

        if code == type_code::ANNOTATION {
            // skip the wrapper header down to the wrapped value
            self.read_length(code, nibble)?;
            self.annotation_start = Some(self.cursor.position());
            let list_len = self.cursor.read_var_uint32()? as usize;
            if list_len == 0 {
                return Err(Error::malformed(
                    "annotation wrapper with no annotations",
                    self.cursor.position(),
                ));
            }
            self.cursor.skip(list_len)?;
            td = self.cursor.read_u8()?;
            let split = split_descriptor(td);
            code = split.0;
            nibble = split.1;
            if code == type_code::ANNOTATION {
                return Err(Error::malformed(
                    "annotation wrapper directly inside another",
                    self.cursor.position(),
                ));
            }
        } else {
            self.annotation_start = None;
        }

        let ion_type = IonType::from_type_code(code)
            .ok_or(Error::malformed("reserved type code", self.cursor.position()))?;
        let value_len = self.read_length(code, nibble)?;

        if nibble != length_code::NULL && self.cursor.position() + value_len > self.local_end {
            return Err(Error::malformed(
                "value length overruns the enclosing container",
                self.cursor.position(),
            ));
        }

        self.value_tid = td;
        self.value_type = ion_type;
        self.value_len = value_len;
        self.state = CursorState::BeforeContents;
        Ok(ion_type)
    }

    /// Decode the content length that follows a type descriptor
    fn read_length(&mut self, code: u8, nibble: u8) -> Result<usize> {
        match code {
            type_code::NULL | type_code::BOOL => Ok(0),
            _ => match nibble {
                length_code::NULL => Ok(0),
                length_code::VAR_LEN => Ok(self.cursor.read_var_uint32()? as usize),
                // legacy writers marked sorted structs with nibble 1
                // and an explicit length field
                1 if code == type_code::STRUCT => Ok(self.cursor.read_var_uint32()? as usize),
                n => Ok(n as usize),
            },
        }
    }

    /// Peek at an annotation wrapper and, when it is a symbol table
    /// declaration, parse and install it without surfacing it. The
    /// cursor ends after the wrapper on success and exactly where it
    /// started otherwise.
    fn try_absorb_symbol_table(&mut self, td: u8) -> Result<bool> {
        let entry = self.cursor.position();
        let (code, nibble) = split_descriptor(td);
        self.read_length(code, nibble)?;
        let list_len = self.cursor.read_var_uint32()? as usize;
        if list_len == 0 {
            self.cursor.set_position(entry)?;
            return Ok(false);
        }
        let list_end = self.cursor.position() + list_len;
        let first_sid = self.cursor.read_var_uint32()?;
        if first_sid != system_sid::ION_SYMBOL_TABLE {
            self.cursor.set_position(entry)?;
            return Ok(false);
        }

        self.cursor.set_position(list_end)?;
        let struct_td = self.cursor.read_u8()?;
        let (struct_code, struct_nibble) = split_descriptor(struct_td);
        if struct_code != type_code::STRUCT || struct_nibble == length_code::NULL {
            self.cursor.set_position(entry)?;
            return Ok(false);
        }
        let len = self.read_length(struct_code, struct_nibble)?;
        let struct_end = self.cursor.position() + len;
        if struct_end > self.local_end {
            return Err(Error::malformed(
                "symbol table overruns the enclosing container",
                self.cursor.position(),
            ));
        }
        self.parse_symbol_table(struct_end)?;
        Ok(true)
    }

    /// Parse the fields of a symbol-table struct in place, driving the
    /// reader's own cursor machinery over the struct's extent
    fn parse_symbol_table(&mut self, struct_end: usize) -> Result<()> {
        let saved_context = self.context;
        let saved_recognition = self.recognition;
        let saved_local_end = self.local_end;
        let saved_depth = self.stack.len();

        self.context = ContainerContext::Struct;
        self.recognition = SymtabRecognition::Inactive;
        self.local_end = struct_end;
        self.state = CursorState::BeforeTypeDescriptor;

        let parse = self.parse_symbol_table_fields();

        self.stack.truncate(saved_depth);
        self.context = saved_context;
        self.recognition = saved_recognition;
        self.local_end = saved_local_end;
        self.state = CursorState::BeforeTypeDescriptor;
        self.eof = false;
        self.field_sid = None;
        self.annotation_start = None;

        let (table, declared_name, version) = parse?;
        self.cursor.set_position(struct_end)?;

        if let Some(name) = declared_name {
            // a named table is a shared table; register it and keep it
            // active for the rest of this scope
            let mut table = table;
            table.lock(&name, version.max(1))?;
            let table = Arc::new(table);
            if let Some(catalog) = &self.catalog {
                catalog.put(Arc::clone(&table))?;
            }
            debug!(name = %name, version, max_id = table.max_id(), "absorbed shared symbol table");
            self.symbols = table;
        } else {
            debug!(max_id = table.max_id(), "absorbed local symbol table");
            self.symbols = Arc::new(table);
        }
        Ok(())
    }

    fn parse_symbol_table_fields(&mut self) -> Result<(SymbolTable, Option<String>, u32)> {
        let mut table = SymbolTable::new_local();
        let mut declared_name = None;
        let mut version: u32 = 0;

        while self.has_next()? {
            let ion_type = self.next()?;
            match self.field_sid {
                Some(system_sid::NAME) if ion_type == IonType::String => {
                    declared_name = Some(self.string_value()?.to_string());
                }
                Some(system_sid::VERSION) if ion_type == IonType::Int => {
                    version = u32::try_from(self.int_value()?).unwrap_or(0);
                }
                Some(system_sid::MAX_ID) if ion_type == IonType::Int => {
                    // declared max_id carries no information for the
                    // stream's own table
                    let _ = self.int_value()?;
                }
                Some(system_sid::IMPORTS) if ion_type == IonType::List => {
                    self.step_into()?;
                    while self.has_next()? {
                        if self.next()? == IonType::Struct && !self.is_null_value() {
                            self.read_one_import(&mut table)?;
                        }
                    }
                    self.step_out()?;
                }
                Some(system_sid::SYMBOLS) if ion_type.is_container() => {
                    // sid-keyed struct from legacy writers, plain list
                    // otherwise
                    let keyed_by_sid = ion_type == IonType::Struct;
                    if self.is_null_value() {
                        continue;
                    }
                    self.step_into()?;
                    while self.has_next()? {
                        if self.next()? != IonType::String || self.is_null_value() {
                            continue; // open content, skip quietly
                        }
                        let sid = if keyed_by_sid {
                            self.field_sid.unwrap_or(0)
                        } else {
                            table.max_id() + 1
                        };
                        let text = self.string_value()?.to_string();
                        table.define(&text, sid)?;
                    }
                    self.step_out()?;
                }
                _ => {} // open content, skipped by the next scan
            }
        }
        Ok((table, declared_name, version))
    }

    fn read_one_import(&mut self, table: &mut SymbolTable) -> Result<()> {
        let mut name: Option<String> = None;
        let mut version: Option<u32> = None;
        let mut max_id: u32 = 0;

        self.step_into()?;
        while self.has_next()? {
            let ion_type = self.next()?;
            match self.field_sid {
                Some(system_sid::NAME)
                    if matches!(ion_type, IonType::String | IonType::Symbol) =>
                {
                    name = Some(if ion_type == IonType::String {
                        self.string_value()?.to_string()
                    } else {
                        self.symbol_value()?
                    });
                }
                Some(system_sid::VERSION) if ion_type == IonType::Int => {
                    version = u32::try_from(self.int_value()?).ok();
                }
                Some(system_sid::MAX_ID) if ion_type == IonType::Int => {
                    max_id = u32::try_from(self.int_value()?).unwrap_or(0);
                }
                _ => {}
            }
        }
        self.step_out()?;

        let name = name
            .ok_or_else(|| Error::SymbolTable("import declaration without a name".into()))?;
        let catalog = self.catalog.as_ref().ok_or_else(|| {
            Error::SymbolTable(format!("no catalog to resolve import '{name}'"))
        })?;
        let shared = catalog
            .resolve(&name, version)
            .ok_or_else(|| Error::SymbolTable(format!("import '{name}' not found in catalog")))?;
        table.import_with_max_id(shared, max_id)
    }

    /// Step into the container the cursor is positioned on
    pub fn step_into(&mut self) -> Result<()> {
        self.check_usable()?;
        if self.state != CursorState::BeforeContents || !self.value_type.is_container() {
            return Err(Error::InvalidState("step_into is only valid on a container value"));
        }
        if self.is_null_value() {
            return Err(Error::InvalidState("cannot step into a null container"));
        }
        let next_position = self.cursor.position() + self.value_len;
        self.stack.push(Frame {
            next_position,
            context: self.context,
            recognition: self.recognition,
            local_end: self.local_end,
            symbols: Arc::clone(&self.symbols),
        });
        self.context = match self.value_type {
            IonType::List => ContainerContext::List,
            IonType::Sexp => ContainerContext::Sexp,
            _ => ContainerContext::Struct,
        };
        self.recognition = if self.context == ContainerContext::Sexp {
            SymtabRecognition::Active
        } else {
            SymtabRecognition::Inactive
        };
        self.local_end = next_position;
        self.state = CursorState::BeforeTypeDescriptor;
        self.field_sid = None;
        self.eof = false;
        Ok(())
    }

    /// Step out to the first sibling after the container
    pub fn step_out(&mut self) -> Result<()> {
        self.check_usable()?;
        let frame = self
            .stack
            .pop()
            .ok_or(Error::InvalidState("step_out without a matching step_into"))?;
        let result = self.cursor.set_position(frame.next_position);
        self.context = frame.context;
        self.recognition = frame.recognition;
        self.local_end = frame.local_end;
        self.symbols = frame.symbols;
        self.state = CursorState::BeforeTypeDescriptor;
        self.field_sid = None;
        self.eof = false;
        self.poison(result)
    }

    /// Count the children of the current container without moving the
    /// cursor or touching the symbol table
    pub fn get_container_size(&mut self) -> Result<usize> {
        self.check_usable()?;
        if self.state != CursorState::BeforeContents || !self.value_type.is_container() {
            return Err(Error::InvalidState("container size needs a container value"));
        }
        if self.is_null_value() {
            return Err(Error::InvalidState("cannot size a null container"));
        }
        let saved = self.cursor.position();
        let counting_struct = self.value_type == IonType::Struct;
        let end = saved + self.value_len;

        let count = self.scan_children(end, counting_struct);
        let restore = self.cursor.set_position(saved);
        let count = self.poison(count)?;
        restore?;
        Ok(count)
    }

    fn scan_children(&mut self, end: usize, counting_struct: bool) -> Result<usize> {
        let mut count = 0;
        while self.cursor.position() < end {
            if counting_struct {
                self.cursor.read_var_uint32()?;
            }
            let td = self.cursor.read_u8()?;
            let (code, nibble) = split_descriptor(td);
            if code == type_code::RESERVED {
                return Err(Error::malformed("reserved type code", self.cursor.position()));
            }
            let len = self.read_length(code, nibble)?;
            if nibble != length_code::NULL {
                self.cursor.skip(len)?;
            }
            count += 1;
        }
        Ok(count)
    }

    pub fn field_sid(&self) -> Option<u32> {
        self.field_sid
    }

    /// The current value's field name, when inside a struct. Unknown
    /// ids render as `$<id>` placeholders.
    pub fn field_name(&self) -> Result<Option<String>> {
        Ok(self.field_sid.map(|sid| self.resolve_sid(sid)))
    }

    fn resolve_sid(&self, sid: u32) -> String {
        match self.symbols.find_by_id(sid) {
            Some(name) => name.to_string(),
            None => format!("${sid}"),
        }
    }

    /// Annotation symbol ids of the current value, in order
    pub fn annotation_sids(&mut self) -> Result<Vec<u32>> {
        self.check_usable()?;
        if self.state != CursorState::BeforeContents {
            return Err(Error::InvalidState("annotations need a current value"));
        }
        let Some(start) = self.annotation_start else {
            return Ok(Vec::new());
        };
        let saved = self.cursor.position();
        self.cursor.set_position(start)?;
        let scan = (|| {
            let list_len = self.cursor.read_var_uint32()? as usize;
            let list_end = self.cursor.position() + list_len;
            let mut sids = Vec::new();
            while self.cursor.position() < list_end {
                sids.push(self.cursor.read_var_uint32()?);
            }
            Ok(sids)
        })();
        self.cursor.set_position(saved)?;
        self.poison(scan)
    }

    pub fn annotations(&mut self) -> Result<Vec<String>> {
        let sids = self.annotation_sids()?;
        Ok(sids.into_iter().map(|sid| self.resolve_sid(sid)).collect())
    }

    /// Whether the current value is a null of any type
    pub fn is_null_value(&self) -> bool {
        if self.state != CursorState::BeforeContents {
            return false;
        }
        let (code, nibble) = split_descriptor(self.value_tid);
        code == type_code::NULL || nibble == length_code::NULL
    }

    /// Guard shared by the scalar getters: correct state, matching
    /// type, non-null
    fn expect_scalar(&self, wanted: &[u8]) -> Result<(u8, u8)> {
        self.check_usable()?;
        if self.state != CursorState::BeforeContents {
            return Err(Error::InvalidState("value already consumed or not selected"));
        }
        let (code, nibble) = split_descriptor(self.value_tid);
        if !wanted.contains(&code) {
            return Err(Error::InvalidState("requested type does not match the value"));
        }
        if code == type_code::NULL || nibble == length_code::NULL {
            return Err(Error::InvalidState("value is null"));
        }
        Ok((code, nibble))
    }

    pub fn bool_value(&mut self) -> Result<bool> {
        let (_, nibble) = self.expect_scalar(&[type_code::BOOL])?;
        let value = match nibble {
            length_code::BOOL_FALSE => false,
            length_code::BOOL_TRUE => true,
            _ => {
                return self.poison(Err(Error::malformed(
                    "boolean nibble out of range",
                    self.cursor.position(),
                )))
            }
        };
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    pub fn int_value(&mut self) -> Result<i64> {
        let (code, _) = self.expect_scalar(&[type_code::POS_INT, type_code::NEG_INT])?;
        let len = self.value_len;
        let result = (|| {
            let magnitude = self.cursor.read_uint_be(len)?;
            if code == type_code::NEG_INT {
                if magnitude > i64::MAX as u64 + 1 {
                    return Err(Error::Overflow("int magnitude does not fit in i64"));
                }
                Ok((magnitude as i64).wrapping_neg())
            } else {
                if magnitude > i64::MAX as u64 {
                    return Err(Error::Overflow("int magnitude does not fit in i64"));
                }
                Ok(magnitude as i64)
            }
        })();
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    pub fn float_value(&mut self) -> Result<f64> {
        self.expect_scalar(&[type_code::FLOAT])?;
        let len = self.value_len;
        let result = self.cursor.read_float_content(len);
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    pub fn decimal_value(&mut self) -> Result<Decimal> {
        self.expect_scalar(&[type_code::DECIMAL])?;
        let len = self.value_len;
        let result = self.cursor.read_decimal_content(len);
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    pub fn timestamp_value(&mut self) -> Result<Timestamp> {
        self.expect_scalar(&[type_code::TIMESTAMP])?;
        let len = self.value_len;
        let result = self.cursor.read_timestamp_content(len);
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    pub fn string_value(&mut self) -> Result<&'a str> {
        self.expect_scalar(&[type_code::STRING])?;
        let len = self.value_len;
        let result = self.cursor.read_string(len);
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }

    /// The raw symbol id of a symbol value
    pub fn symbol_sid(&mut self) -> Result<u32> {
        self.expect_scalar(&[type_code::SYMBOL])?;
        let len = self.value_len;
        let result = (|| {
            let sid = self.cursor.read_uint_be(len)?;
            u32::try_from(sid).map_err(|_| Error::Overflow("symbol id does not fit in 32 bits"))
        })();
        let sid = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(sid)
    }

    /// A symbol value's text, falling back to the `$<id>` placeholder
    /// when the id has no known text
    pub fn symbol_value(&mut self) -> Result<String> {
        let sid = self.symbol_sid()?;
        Ok(self.resolve_sid(sid))
    }

    pub fn bytes_value(&mut self) -> Result<&'a [u8]> {
        self.expect_scalar(&[type_code::BLOB, type_code::CLOB])?;
        let len = self.value_len;
        let result = self.cursor.read_bytes(len);
        let value = self.poison(result)?;
        self.state = CursorState::BeforeTypeDescriptor;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BinaryWriter;

    fn encode(build: impl FnOnce(&mut BinaryWriter)) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        build(&mut writer);
        writer.flush().unwrap()
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = BinaryReader::new(&VERSION_MARKER);
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_scalars_roundtrip() {
        let bytes = encode(|w| {
            w.write_int(-42).unwrap();
            w.write_string("hello").unwrap();
            w.write_bool(true).unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.has_next().unwrap());
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.int_value().unwrap(), -42);
        assert_eq!(reader.next().unwrap(), IonType::String);
        assert_eq!(reader.string_value().unwrap(), "hello");
        assert_eq!(reader.next().unwrap(), IonType::Bool);
        assert!(reader.bool_value().unwrap());
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_value_consumed_twice_is_invalid_state() {
        let bytes = encode(|w| w.write_int(5).unwrap());
        let mut reader = BinaryReader::new(&bytes);
        reader.next().unwrap();
        assert_eq!(reader.int_value().unwrap(), 5);
        assert!(matches!(reader.int_value(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_skipping_unread_values() {
        let bytes = encode(|w| {
            w.write_string("ignored").unwrap();
            w.write_int(9).unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        reader.next().unwrap(); // select the string, never read it
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.int_value().unwrap(), 9);
    }

    #[test]
    fn test_step_into_struct() {
        let bytes = encode(|w| {
            w.start_struct().unwrap();
            w.set_field_name("a").unwrap();
            w.write_int(1).unwrap();
            w.set_field_name("b").unwrap();
            w.write_int(2).unwrap();
            w.close_struct().unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), IonType::Struct);
        reader.step_into().unwrap();
        assert!(reader.is_in_struct());
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.field_name().unwrap().as_deref(), Some("a"));
        assert_eq!(reader.int_value().unwrap(), 1);
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.field_name().unwrap().as_deref(), Some("b"));
        reader.step_out().unwrap();
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_step_out_skips_unread_children() {
        let bytes = encode(|w| {
            w.start_list().unwrap();
            for i in 0..5 {
                w.write_int(i).unwrap();
            }
            w.close_list().unwrap();
            w.write_string("after").unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        reader.next().unwrap();
        reader.step_into().unwrap();
        reader.next().unwrap(); // look at one child only
        reader.step_out().unwrap();
        assert_eq!(reader.next().unwrap(), IonType::String);
        assert_eq!(reader.string_value().unwrap(), "after");
    }

    #[test]
    fn test_container_size_has_no_side_effects() {
        let bytes = encode(|w| {
            w.start_struct().unwrap();
            w.set_field_name("x").unwrap();
            w.write_int(1).unwrap();
            w.set_field_name("y").unwrap();
            w.start_list().unwrap();
            w.write_int(2).unwrap();
            w.write_int(3).unwrap();
            w.close_list().unwrap();
            w.close_struct().unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        reader.next().unwrap();
        assert_eq!(reader.get_container_size().unwrap(), 2);
        // the cursor still steps in normally afterwards
        reader.step_into().unwrap();
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.int_value().unwrap(), 1);
        assert_eq!(reader.next().unwrap(), IonType::List);
        assert_eq!(reader.get_container_size().unwrap(), 2);
    }

    #[test]
    fn test_annotations_surface_in_order() {
        let bytes = encode(|w| {
            w.add_annotation("alpha");
            w.add_annotation("beta");
            w.write_int(1).unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.annotations().unwrap(), vec!["alpha", "beta"]);
        assert_eq!(reader.int_value().unwrap(), 1);
    }

    #[test]
    fn test_embedded_symbol_table_is_transparent() {
        let bytes = encode(|w| {
            w.write_symbol("city").unwrap();
            w.write_symbol("city").unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        // the symbol table struct is absorbed, not surfaced
        assert_eq!(reader.next().unwrap(), IonType::Symbol);
        assert_eq!(reader.symbol_value().unwrap(), "city");
        assert_eq!(reader.next().unwrap(), IonType::Symbol);
        assert_eq!(reader.symbol_value().unwrap(), "city");
        assert!(!reader.has_next().unwrap());
        assert_eq!(reader.symbol_table().find_by_name("city").unwrap(), Some(10));
    }

    #[test]
    fn test_typed_nulls() {
        let bytes = encode(|w| {
            w.write_typed_null(IonType::Int).unwrap();
            w.write_null().unwrap();
        });
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert!(reader.is_null_value());
        assert!(matches!(reader.int_value(), Err(Error::InvalidState(_))));
        assert_eq!(reader.next().unwrap(), IonType::Null);
        assert!(reader.is_null_value());
    }

    #[test]
    fn test_truncated_struct_is_malformed() {
        // struct claims 50 bytes of content, buffer ends long before
        let mut bytes = VERSION_MARKER.to_vec();
        bytes.push(make_struct_td());
        bytes.push(0x80 | 50);
        bytes.extend_from_slice(&[0u8; 5]);
        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.has_next().unwrap());
        let err = reader.next().unwrap_err();
        assert!(matches!(err, Error::MalformedBinary { .. }));
        // the reader refuses to continue afterwards
        assert!(matches!(reader.has_next(), Err(Error::InvalidState(_))));
    }

    fn make_struct_td() -> u8 {
        crate::format::make_descriptor(type_code::STRUCT, length_code::VAR_LEN)
    }

    #[test]
    fn test_reserved_type_code_is_malformed() {
        let mut bytes = VERSION_MARKER.to_vec();
        bytes.push(0xF0);
        let mut reader = BinaryReader::new(&bytes);
        assert!(reader.has_next().unwrap());
        assert!(matches!(reader.next(), Err(Error::MalformedBinary { .. })));
    }

    #[test]
    fn test_ordered_struct_nibble_reads_as_var_length() {
        // struct td with nibble 1, then an explicit length field
        let mut bytes = VERSION_MARKER.to_vec();
        bytes.push(crate::format::make_descriptor(type_code::STRUCT, 1));
        bytes.push(0x80 | 3); // length 3
        bytes.push(0x80 | 10); // field sid 10
        bytes.extend_from_slice(&[0x21, 0x07]); // int 7
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), IonType::Struct);
        reader.step_into().unwrap();
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.field_sid(), Some(10));
        assert_eq!(reader.int_value().unwrap(), 7);
        reader.step_out().unwrap();
    }

    #[test]
    fn test_mid_stream_version_marker_resets_symbols() {
        let first = encode(|w| w.write_symbol("transient").unwrap());
        let second = encode(|w| w.write_int(3).unwrap());
        let mut bytes = first;
        bytes.extend_from_slice(&second);

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.next().unwrap(), IonType::Symbol);
        assert_eq!(reader.symbol_value().unwrap(), "transient");
        assert_eq!(reader.next().unwrap(), IonType::Int);
        assert_eq!(reader.int_value().unwrap(), 3);
        // the second marker dropped the local table
        assert_eq!(reader.symbol_table().find_by_name("transient").unwrap(), None);
    }

    #[test]
    fn test_step_out_without_step_into() {
        let bytes = encode(|w| w.write_int(1).unwrap());
        let mut reader = BinaryReader::new(&bytes);
        assert!(matches!(reader.step_out(), Err(Error::InvalidState(_))));
    }
}
