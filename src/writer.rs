// SPDX-License-Identifier: MIT
//! Push-style binary writer with deferred container lengths
//!
//! The wire format puts every container's encoded length in front of
//! its content, but a forward-streaming writer only learns that length
//! when the container closes. The writer therefore emits a single
//! placeholder byte where each header belongs and records a patch
//! point. Every byte written while a container is open is added to the
//! accumulated length of *every* open ancestor, not just the innermost
//! one; when a closed container turns out to need a multi-byte length
//! field, that growth is patched into the remaining ancestors as well.
//! `flush` then makes one forward pass that interleaves verbatim buffer
//! ranges with the final headers.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{length_code, make_descriptor, system_sid, type_code, IonType, VERSION_MARKER};
use crate::symtab::SymbolTable;
use crate::types::{Decimal, Timestamp};
use crate::varint::{
    len_decimal, len_float, len_int_magnitude, len_length_field, len_timestamp, len_uint_be,
    len_var_uint, write_decimal_content, write_float_content, write_timestamp_content,
    write_uint_be, write_var_uint,
};

/// A deferred container or annotation-wrapper header
#[derive(Debug, Clone, Copy)]
struct PatchPoint {
    /// Buffer offset of the placeholder byte
    offset: usize,
    /// Content bytes accumulated so far
    length: usize,
    type_code: u8,
    /// Whether values written inside this container are struct members
    in_struct: bool,
}

/// A field name or annotation waiting to be resolved to a symbol id
#[derive(Debug, Clone)]
enum PendingSymbol {
    Name(String),
    Sid(u32),
}

pub struct BinaryWriter {
    buf: Vec<u8>,
    /// Every patch point ever opened, in buffer-offset order; flush
    /// walks this once
    patches: Vec<PatchPoint>,
    /// Indices into `patches` for the currently open headers
    stack: Vec<usize>,
    in_struct: bool,
    field_name: Option<PendingSymbol>,
    annotations: Vec<PendingSymbol>,
    symbols: SymbolTable,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            patches: Vec::new(),
            stack: Vec::new(),
            in_struct: false,
            field_name: None,
            annotations: Vec::new(),
            symbols: SymbolTable::new_local(),
        }
    }

    /// Seed the stream's symbol table with a shared import. Must happen
    /// before any local symbol is created.
    pub fn import_shared_table(&mut self, table: Arc<SymbolTable>) -> Result<()> {
        self.symbols.import(table)
    }

    pub fn is_in_struct(&self) -> bool {
        self.in_struct
    }

    pub fn depth(&self) -> usize {
        self.stack.iter().filter(|&&i| self.patches[i].type_code != type_code::ANNOTATION).count()
    }

    /// Name the next value written inside a struct
    pub fn set_field_name(&mut self, name: &str) -> Result<()> {
        if !self.in_struct {
            return Err(Error::InvalidState("field names are only valid inside a struct"));
        }
        self.field_name = Some(PendingSymbol::Name(name.to_string()));
        Ok(())
    }

    pub fn set_field_name_sid(&mut self, sid: u32) -> Result<()> {
        if !self.in_struct {
            return Err(Error::InvalidState("field names are only valid inside a struct"));
        }
        if sid == 0 {
            return Err(Error::InvalidState("symbol ids are positive"));
        }
        self.field_name = Some(PendingSymbol::Sid(sid));
        Ok(())
    }

    /// Queue an annotation for the next value
    pub fn add_annotation(&mut self, name: &str) {
        self.annotations.push(PendingSymbol::Name(name.to_string()));
    }

    pub fn add_annotation_sid(&mut self, sid: u32) {
        self.annotations.push(PendingSymbol::Sid(sid));
    }

    fn resolve(&mut self, pending: PendingSymbol) -> Result<u32> {
        match pending {
            PendingSymbol::Sid(0) => Err(Error::InvalidState("symbol ids are positive")),
            PendingSymbol::Sid(sid) => Ok(sid),
            PendingSymbol::Name(name) => self.symbols.add(&name),
        }
    }

    fn push(&mut self, type_code: u8) {
        self.stack.push(self.patches.len());
        self.patches.push(PatchPoint {
            offset: self.buf.len(),
            length: 0,
            type_code,
            in_struct: self.in_struct,
        });
    }

    /// Add freshly written content bytes to every open header
    fn patch(&mut self, added: usize) {
        for &index in &self.stack {
            self.patches[index].length += added;
        }
    }

    fn pop(&mut self) -> Result<()> {
        let index = self
            .stack
            .pop()
            .ok_or(Error::InvalidState("close without a matching start"))?;
        // once closed, the container's header may have grown a length
        // field; the growth belongs to every remaining ancestor
        let grown = len_length_field(self.patches[index].length);
        if grown > 0 {
            self.patch(grown);
        }
        Ok(())
    }

    /// Write the pending field name and open the pending annotation
    /// wrapper, if any, ahead of the next value
    fn start_value(&mut self) -> Result<()> {
        if self.in_struct {
            let pending = self
                .field_name
                .take()
                .ok_or(Error::InvalidState("struct members need a field name"))?;
            let sid = self.resolve(pending)?;
            let written = write_var_uint(&mut self.buf, sid as u64, true);
            self.patch(written);
        } else if self.field_name.is_some() {
            return Err(Error::InvalidState("field names are only valid inside a struct"));
        }

        if !self.annotations.is_empty() {
            let pendings = std::mem::take(&mut self.annotations);
            let mut sids = Vec::with_capacity(pendings.len());
            for pending in pendings {
                sids.push(self.resolve(pending)?);
            }
            let list_len: usize = sids.iter().map(|&sid| len_var_uint(sid as u64)).sum();

            // the wrapper is patched exactly like a container around
            // the upcoming value
            self.patch(1);
            self.push(type_code::ANNOTATION);
            self.buf.push(make_descriptor(type_code::ANNOTATION, 0));
            let mut written = write_var_uint(&mut self.buf, list_len as u64, true);
            for sid in sids {
                write_var_uint(&mut self.buf, sid as u64, true);
            }
            written += list_len;
            self.patch(written);
        }
        Ok(())
    }

    /// Close the annotation wrapper opened by `start_value`, if any
    fn close_value(&mut self) -> Result<()> {
        if let Some(&top) = self.stack.last() {
            if self.patches[top].type_code == type_code::ANNOTATION {
                self.pop()?;
            }
        }
        Ok(())
    }

    /// Emit a type descriptor, spilling the length into a VarUInt field
    /// when it does not fit the nibble. Returns header bytes written.
    fn emit_type_desc(&mut self, code: u8, len: usize) -> usize {
        if len < length_code::VAR_LEN as usize {
            self.buf.push(make_descriptor(code, len as u8));
            1
        } else {
            self.buf.push(make_descriptor(code, length_code::VAR_LEN));
            1 + write_var_uint(&mut self.buf, len as u64, true)
        }
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_typed_null(IonType::Null)
    }

    pub fn write_typed_null(&mut self, ion_type: IonType) -> Result<()> {
        self.start_value()?;
        self.buf.push(make_descriptor(ion_type.type_code(), length_code::NULL));
        self.patch(1);
        self.close_value()
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.start_value()?;
        let nibble = if value { length_code::BOOL_TRUE } else { length_code::BOOL_FALSE };
        self.buf.push(make_descriptor(type_code::BOOL, nibble));
        self.patch(1);
        self.close_value()
    }

    pub fn write_int(&mut self, value: i64) -> Result<()> {
        self.start_value()?;
        let code = if value < 0 { type_code::NEG_INT } else { type_code::POS_INT };
        let len = len_int_magnitude(value);
        self.buf.push(make_descriptor(code, len as u8));
        write_uint_be(&mut self.buf, value.unsigned_abs(), len);
        self.patch(1 + len);
        self.close_value()
    }

    pub fn write_float(&mut self, value: f64) -> Result<()> {
        self.start_value()?;
        let len = len_float(value);
        self.buf.push(make_descriptor(type_code::FLOAT, len as u8));
        write_float_content(&mut self.buf, value);
        self.patch(1 + len);
        self.close_value()
    }

    pub fn write_decimal(&mut self, value: &Decimal) -> Result<()> {
        self.start_value()?;
        let len = len_decimal(value);
        let header = self.emit_type_desc(type_code::DECIMAL, len);
        write_decimal_content(&mut self.buf, value);
        self.patch(header + len);
        self.close_value()
    }

    pub fn write_timestamp(&mut self, value: &Timestamp) -> Result<()> {
        self.start_value()?;
        let len = len_timestamp(value);
        let header = self.emit_type_desc(type_code::TIMESTAMP, len);
        write_timestamp_content(&mut self.buf, value);
        self.patch(header + len);
        self.close_value()
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.start_value()?;
        let bytes = value.as_bytes();
        let header = self.emit_type_desc(type_code::STRING, bytes.len());
        self.buf.extend_from_slice(bytes);
        self.patch(header + bytes.len());
        self.close_value()
    }

    /// Write a symbol value, creating a local symbol when the name is
    /// not already visible
    pub fn write_symbol(&mut self, name: &str) -> Result<()> {
        let sid = self.symbols.add(name)?;
        self.write_symbol_sid(sid)
    }

    pub fn write_symbol_sid(&mut self, sid: u32) -> Result<()> {
        if sid == 0 {
            return Err(Error::InvalidState("symbol ids are positive"));
        }
        self.start_value()?;
        let len = len_uint_be(sid as u64);
        self.buf.push(make_descriptor(type_code::SYMBOL, len as u8));
        write_uint_be(&mut self.buf, sid as u64, len);
        self.patch(1 + len);
        self.close_value()
    }

    pub fn write_blob(&mut self, value: &[u8]) -> Result<()> {
        self.write_lob(type_code::BLOB, value)
    }

    pub fn write_clob(&mut self, value: &[u8]) -> Result<()> {
        self.write_lob(type_code::CLOB, value)
    }

    fn write_lob(&mut self, code: u8, value: &[u8]) -> Result<()> {
        self.start_value()?;
        let header = self.emit_type_desc(code, value.len());
        self.buf.extend_from_slice(value);
        self.patch(header + value.len());
        self.close_value()
    }

    pub fn start_list(&mut self) -> Result<()> {
        self.start_container(type_code::LIST, false)
    }

    pub fn start_sexp(&mut self) -> Result<()> {
        self.start_container(type_code::SEXP, false)
    }

    pub fn start_struct(&mut self) -> Result<()> {
        self.start_container(type_code::STRUCT, true)
    }

    fn start_container(&mut self, code: u8, is_struct: bool) -> Result<()> {
        self.start_value()?;
        self.patch(1);
        self.in_struct = is_struct;
        self.push(code);
        self.buf.push(make_descriptor(code, 0));
        Ok(())
    }

    pub fn close_list(&mut self) -> Result<()> {
        self.close_container(type_code::LIST)
    }

    pub fn close_sexp(&mut self) -> Result<()> {
        self.close_container(type_code::SEXP)
    }

    pub fn close_struct(&mut self) -> Result<()> {
        self.close_container(type_code::STRUCT)
    }

    fn close_container(&mut self, code: u8) -> Result<()> {
        match self.stack.last() {
            Some(&top) if self.patches[top].type_code == code => {}
            Some(_) => return Err(Error::InvalidState("close does not match the open container")),
            None => return Err(Error::InvalidState("close without a matching start")),
        }
        if self.field_name.is_some() {
            return Err(Error::InvalidState("a pending field name has no value"));
        }
        self.pop()?;
        self.close_value()?;
        self.in_struct = match self.stack.last() {
            Some(&top) => self.patches[top].in_struct,
            None => false,
        };
        Ok(())
    }

    /// Finalize the stream: version marker, the synthesized symbol
    /// table when the session defined local symbols or imports, then
    /// the content buffer with every placeholder replaced by its final
    /// header. Consumes the writer; a stream is only emitted when the
    /// predicted and actual byte counts agree.
    pub fn flush(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(Error::InvalidState("flush with an open container"));
        }
        if !self.annotations.is_empty() || self.field_name.is_some() {
            return Err(Error::InvalidState("flush with a pending field name or annotation"));
        }

        let symtab = if self.symbols.has_local_symbols() || !self.symbols.import_records().is_empty()
        {
            encode_symbol_table(&self.symbols)?
        } else {
            Vec::new()
        };

        let patch_growth: usize = self
            .patches
            .iter()
            .map(|patch| len_length_field(patch.length))
            .sum();
        let expected = VERSION_MARKER.len() + symtab.len() + self.buf.len() + patch_growth;

        let mut out = Vec::with_capacity(expected);
        out.extend_from_slice(&VERSION_MARKER);
        out.extend_from_slice(&symtab);

        let mut pos = 0;
        for patch in &self.patches {
            out.extend_from_slice(&self.buf[pos..patch.offset]);
            if patch.length < length_code::VAR_LEN as usize {
                out.push(make_descriptor(patch.type_code, patch.length as u8));
            } else {
                out.push(make_descriptor(patch.type_code, length_code::VAR_LEN));
                write_var_uint(&mut out, patch.length as u64, true);
            }
            pos = patch.offset + 1; // the placeholder byte is replaced
        }
        out.extend_from_slice(&self.buf[pos..]);

        if out.len() != expected {
            return Err(Error::InternalConsistency(format!(
                "flush predicted {expected} bytes but produced {}",
                out.len()
            )));
        }
        debug!(
            bytes = out.len(),
            patches = self.patches.len(),
            local_symbols = self.symbols.local_symbols().count(),
            "flushed binary stream"
        );
        Ok(out)
    }

    /// Flush into an `io::Write`, returning the byte count
    pub fn flush_to<W: Write>(self, mut writer: W) -> Result<usize> {
        let bytes = self.flush()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a type descriptor plus optional VarUInt length field
fn put_type_desc(out: &mut Vec<u8>, code: u8, len: usize) -> usize {
    if len < length_code::VAR_LEN as usize {
        out.push(make_descriptor(code, len as u8));
        1
    } else {
        out.push(make_descriptor(code, length_code::VAR_LEN));
        1 + write_var_uint(out, len as u64, true)
    }
}

fn put_string_field(out: &mut Vec<u8>, field_sid: u32, text: &str) -> usize {
    let mut written = write_var_uint(out, field_sid as u64, true);
    written += put_type_desc(out, type_code::STRING, text.len());
    out.extend_from_slice(text.as_bytes());
    written + text.len()
}

fn put_uint_field(out: &mut Vec<u8>, field_sid: u32, value: u64) -> usize {
    let len = len_uint_be(value);
    let mut written = write_var_uint(out, field_sid as u64, true);
    written += put_type_desc(out, type_code::POS_INT, len);
    write_uint_be(out, value, len);
    written + len
}

fn len_string_field(field_sid: u32, text: &str) -> usize {
    len_var_uint(field_sid as u64) + 1 + len_length_field(text.len()) + text.len()
}

fn len_uint_field(field_sid: u32, value: u64) -> usize {
    let len = len_uint_be(value);
    len_var_uint(field_sid as u64) + 1 + len
}

/// Serialize the stream's local symbol table as an annotated struct:
/// `$ion_symbol_table::{imports: [...], symbols: {...}}` with local
/// symbols keyed by their sid. The predicted length is verified against
/// the produced bytes.
fn encode_symbol_table(symbols: &SymbolTable) -> Result<Vec<u8>> {
    let imports = symbols.import_records();
    let locals: Vec<(u32, &str)> = symbols.local_symbols().collect();

    // imports: [{name, version, max_id}, ...]
    let import_content_lens: Vec<usize> = imports
        .iter()
        .map(|import| {
            len_string_field(system_sid::NAME, &import.name)
                + len_uint_field(system_sid::VERSION, import.version as u64)
                + len_uint_field(system_sid::MAX_ID, import.max_id as u64)
        })
        .collect();
    let imports_list_len: usize = import_content_lens
        .iter()
        .map(|&len| 1 + len_length_field(len) + len)
        .sum();
    let imports_field_len = if imports.is_empty() {
        0
    } else {
        len_var_uint(system_sid::IMPORTS as u64) + 1 + len_length_field(imports_list_len) + imports_list_len
    };

    // symbols: {$sid: "name", ...}
    let symbols_struct_len: usize = locals
        .iter()
        .map(|&(sid, name)| len_var_uint(sid as u64) + 1 + len_length_field(name.len()) + name.len())
        .sum();
    let symbols_field_len = if locals.is_empty() {
        0
    } else {
        len_var_uint(system_sid::SYMBOLS as u64) + 1 + len_length_field(symbols_struct_len) + symbols_struct_len
    };

    let struct_content_len = imports_field_len + symbols_field_len;
    // annotation list: one sid, one length byte for the list
    let wrapped_len = 2 + 1 + len_length_field(struct_content_len) + struct_content_len;
    let expected = 1 + len_length_field(wrapped_len) + wrapped_len;

    let mut out = Vec::with_capacity(expected);
    put_type_desc(&mut out, type_code::ANNOTATION, wrapped_len);
    write_var_uint(&mut out, len_var_uint(system_sid::ION_SYMBOL_TABLE as u64) as u64, true);
    write_var_uint(&mut out, system_sid::ION_SYMBOL_TABLE as u64, true);
    put_type_desc(&mut out, type_code::STRUCT, struct_content_len);

    if !imports.is_empty() {
        write_var_uint(&mut out, system_sid::IMPORTS as u64, true);
        put_type_desc(&mut out, type_code::LIST, imports_list_len);
        for (import, &content_len) in imports.iter().zip(&import_content_lens) {
            put_type_desc(&mut out, type_code::STRUCT, content_len);
            put_string_field(&mut out, system_sid::NAME, &import.name);
            put_uint_field(&mut out, system_sid::VERSION, import.version as u64);
            put_uint_field(&mut out, system_sid::MAX_ID, import.max_id as u64);
        }
    }

    if !locals.is_empty() {
        write_var_uint(&mut out, system_sid::SYMBOLS as u64, true);
        put_type_desc(&mut out, type_code::STRUCT, symbols_struct_len);
        for (sid, name) in &locals {
            put_string_field(&mut out, *sid, name);
        }
    }

    if out.len() != expected {
        return Err(Error::InternalConsistency(format!(
            "symbol table predicted {expected} bytes but produced {}",
            out.len()
        )));
    }
    Ok(out)
}
