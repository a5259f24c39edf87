// SPDX-License-Identifier: MIT
//! # Ion Codec
//!
//! A self-describing binary codec for dynamically typed value trees
//! (nulls, scalars, strings, blobs, ordered containers, structs), with
//! a shared symbol-table mechanism that compresses repeated field and
//! annotation names into small integers.
//!
//! ## Format Overview
//!
//! Every stream opens with a fixed version marker and is followed by a
//! sequence of value envelopes. Each envelope is self-describing: one
//! type descriptor byte whose high nibble is the type code and whose
//! low nibble is the content length (or a sentinel for "VarUInt length
//! follows" / "typed null"), then the content bytes. Struct members
//! carry a leading VarUInt field-name symbol id; annotated values are
//! wrapped in an envelope of their own.
//!
//! ```text
//! Binary stream layout:
//! - Version marker: E0 01 00 EA (4 bytes)
//! - Optional symbol table: $ion_symbol_table::{imports, symbols}
//! - Value envelopes:
//!   [annotation wrapper?][type descriptor][VarUInt length?][content]
//! ```
//!
//! Field names, annotations and symbol values are symbol ids resolved
//! against the active symbol table: the fixed system table, any
//! imported shared tables, and the stream's local symbols. The writer
//! collects local symbols as values are written and prepends the
//! serialized table at flush; the reader absorbs embedded symbol
//! tables (and mid-stream version markers, which reset the table)
//! without ever surfacing them to the caller.
//!
//! ## Key Design Points
//!
//! - **Single-pass writing**: container lengths precede content on the
//!   wire, so the writer records a patch point per open container and
//!   back-fills every header in one pass at flush.
//! - **Random access while streaming**: the reader keeps a stack of
//!   container extents, so `step_out` repositions in O(1) and
//!   `get_container_size` scans headers without materializing values.
//! - **Partitioned symbol ids**: system, imported and local symbols
//!   occupy contiguous, non-overlapping id ranges; shared tables are
//!   reusable across streams through a [`Catalog`].
//!
//! ## Usage
//!
//! ```rust
//! use ion_codec::{BinaryReader, BinaryWriter};
//!
//! let mut writer = BinaryWriter::new();
//! writer.start_struct().unwrap();
//! writer.set_field_name("name").unwrap();
//! writer.write_string("hi").unwrap();
//! writer.close_struct().unwrap();
//! let bytes = writer.flush().unwrap();
//!
//! let mut reader = BinaryReader::new(&bytes);
//! reader.next().unwrap();
//! reader.step_into().unwrap();
//! reader.next().unwrap();
//! assert_eq!(reader.field_name().unwrap().as_deref(), Some("name"));
//! assert_eq!(reader.string_value().unwrap(), "hi");
//! ```

pub mod catalog;
pub mod error;
pub mod format;
pub mod reader;
pub mod symtab;
pub mod types;
pub mod varint;
pub mod writer;

// Re-export main types
pub use catalog::Catalog;
pub use error::{Error, Result};
pub use format::{IonType, VERSION_MARKER};
pub use reader::BinaryReader;
pub use symtab::{system_table, SymbolTable, SymbolTableKind};
pub use types::{Decimal, Timestamp};
pub use writer::BinaryWriter;
