// SPDX-License-Identifier: MIT
//! End-to-end encode/decode tests over whole value trees

use std::sync::Arc;

use ion_codec::{
    BinaryReader, BinaryWriter, Catalog, Decimal, IonType, SymbolTable, Timestamp,
};

/// A value tree for driving the writer and checking the reader, with
/// type-aware equality (a null int is not a plain null, annotation
/// order matters)
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null(IonType),
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Timestamp(Timestamp),
    String(String),
    Symbol(String),
    Blob(Vec<u8>),
    Clob(Vec<u8>),
    List(Vec<Annotated>),
    Sexp(Vec<Annotated>),
    Struct(Vec<(String, Annotated)>),
}

#[derive(Debug, Clone, PartialEq)]
struct Annotated {
    annotations: Vec<String>,
    value: Value,
}

impl Annotated {
    fn plain(value: Value) -> Self {
        Self { annotations: Vec::new(), value }
    }

    fn with(annotations: &[&str], value: Value) -> Self {
        Self {
            annotations: annotations.iter().map(|a| a.to_string()).collect(),
            value,
        }
    }
}

fn write_value(writer: &mut BinaryWriter, value: &Annotated) {
    for annotation in &value.annotations {
        writer.add_annotation(annotation);
    }
    match &value.value {
        Value::Null(t) => writer.write_typed_null(*t).unwrap(),
        Value::Bool(v) => writer.write_bool(*v).unwrap(),
        Value::Int(v) => writer.write_int(*v).unwrap(),
        Value::Float(v) => writer.write_float(*v).unwrap(),
        Value::Decimal(v) => writer.write_decimal(v).unwrap(),
        Value::Timestamp(v) => writer.write_timestamp(v).unwrap(),
        Value::String(v) => writer.write_string(v).unwrap(),
        Value::Symbol(v) => writer.write_symbol(v).unwrap(),
        Value::Blob(v) => writer.write_blob(v).unwrap(),
        Value::Clob(v) => writer.write_clob(v).unwrap(),
        Value::List(items) => {
            writer.start_list().unwrap();
            for item in items {
                write_value(writer, item);
            }
            writer.close_list().unwrap();
        }
        Value::Sexp(items) => {
            writer.start_sexp().unwrap();
            for item in items {
                write_value(writer, item);
            }
            writer.close_sexp().unwrap();
        }
        Value::Struct(fields) => {
            writer.start_struct().unwrap();
            for (name, field) in fields {
                writer.set_field_name(name).unwrap();
                write_value(writer, field);
            }
            writer.close_struct().unwrap();
        }
    }
}

fn read_value(reader: &mut BinaryReader, ion_type: IonType) -> Annotated {
    let annotations = reader.annotations().unwrap();
    let value = if reader.is_null_value() {
        Value::Null(ion_type)
    } else {
        match ion_type {
            IonType::Null => Value::Null(IonType::Null),
            IonType::Bool => Value::Bool(reader.bool_value().unwrap()),
            IonType::Int => Value::Int(reader.int_value().unwrap()),
            IonType::Float => Value::Float(reader.float_value().unwrap()),
            IonType::Decimal => Value::Decimal(reader.decimal_value().unwrap()),
            IonType::Timestamp => Value::Timestamp(reader.timestamp_value().unwrap()),
            IonType::String => Value::String(reader.string_value().unwrap().to_string()),
            IonType::Symbol => Value::Symbol(reader.symbol_value().unwrap()),
            IonType::Blob => Value::Blob(reader.bytes_value().unwrap().to_vec()),
            IonType::Clob => Value::Clob(reader.bytes_value().unwrap().to_vec()),
            IonType::List | IonType::Sexp => {
                let mut items = Vec::new();
                reader.step_into().unwrap();
                while reader.has_next().unwrap() {
                    let child = reader.next().unwrap();
                    items.push(read_value(reader, child));
                }
                reader.step_out().unwrap();
                if ion_type == IonType::List {
                    Value::List(items)
                } else {
                    Value::Sexp(items)
                }
            }
            IonType::Struct => {
                let mut fields = Vec::new();
                reader.step_into().unwrap();
                while reader.has_next().unwrap() {
                    let child = reader.next().unwrap();
                    let name = reader.field_name().unwrap().expect("struct member name");
                    fields.push((name, read_value(reader, child)));
                }
                reader.step_out().unwrap();
                Value::Struct(fields)
            }
        }
    };
    Annotated { annotations, value }
}

fn roundtrip(values: &[Annotated]) -> Vec<Annotated> {
    let mut writer = BinaryWriter::new();
    for value in values {
        write_value(&mut writer, value);
    }
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    let mut decoded = Vec::new();
    while reader.has_next().unwrap() {
        let ion_type = reader.next().unwrap();
        decoded.push(read_value(&mut reader, ion_type));
    }
    decoded
}

fn assert_roundtrip(values: Vec<Annotated>) {
    let decoded = roundtrip(&values);
    assert_eq!(decoded, values);
}

#[test]
fn test_scalar_roundtrip() {
    assert_roundtrip(vec![
        Annotated::plain(Value::Bool(true)),
        Annotated::plain(Value::Int(0)),
        Annotated::plain(Value::Int(i64::MIN)),
        Annotated::plain(Value::Int(i64::MAX)),
        Annotated::plain(Value::Float(1.25)),
        Annotated::plain(Value::Float(0.0)),
        Annotated::plain(Value::Decimal(Decimal::new(-31_415, -4))),
        Annotated::plain(Value::Timestamp(Timestamp::new(1_700_000_000_000, 120))),
        Annotated::plain(Value::Timestamp(Timestamp::unknown_offset(0))),
        Annotated::plain(Value::String(String::new())),
        Annotated::plain(Value::String("héllo, wörld 🜚".to_string())),
        Annotated::plain(Value::Symbol("a_symbol".to_string())),
        Annotated::plain(Value::Blob(vec![0, 1, 2, 254, 255])),
        Annotated::plain(Value::Clob(b"clob bytes".to_vec())),
    ]);
}

#[test]
fn test_typed_null_roundtrip() {
    assert_roundtrip(vec![
        Annotated::plain(Value::Null(IonType::Null)),
        Annotated::plain(Value::Null(IonType::Int)),
        Annotated::plain(Value::Null(IonType::String)),
        Annotated::plain(Value::Null(IonType::Struct)),
    ]);
}

#[test]
fn test_nested_container_roundtrip() {
    assert_roundtrip(vec![Annotated::plain(Value::Struct(vec![
        (
            "outer".to_string(),
            Annotated::plain(Value::List(vec![
                Annotated::plain(Value::Int(1)),
                Annotated::plain(Value::Struct(vec![(
                    "inner".to_string(),
                    Annotated::plain(Value::Sexp(vec![
                        Annotated::plain(Value::Symbol("op".to_string())),
                        Annotated::plain(Value::Int(2)),
                    ])),
                )])),
            ])),
        ),
        ("empty".to_string(), Annotated::plain(Value::List(Vec::new()))),
    ]))]);
}

#[test]
fn test_deeply_nested_lists() {
    let mut value = Annotated::plain(Value::Int(7));
    for _ in 0..40 {
        value = Annotated::plain(Value::List(vec![value]));
    }
    assert_roundtrip(vec![value]);
}

#[test]
fn test_annotations_roundtrip() {
    assert_roundtrip(vec![
        Annotated::with(&["a"], Value::Int(1)),
        Annotated::with(&["b", "a", "c"], Value::String("x".to_string())),
        Annotated::with(&["wrap"], Value::List(vec![Annotated::with(&["inner"], Value::Bool(false))])),
    ]);
}

#[test]
fn test_large_string_uses_var_length_envelope() {
    let text = "x".repeat(5_000);
    assert_roundtrip(vec![Annotated::plain(Value::String(text))]);
}

#[test]
fn test_struct_with_repeated_field_names_compresses() {
    let fields: Vec<(String, Annotated)> = (0..50)
        .map(|i| ("field".to_string(), Annotated::plain(Value::Int(i))))
        .collect();
    let values = vec![Annotated::plain(Value::Struct(fields))];

    let mut writer = BinaryWriter::new();
    for value in &values {
        write_value(&mut writer, value);
    }
    let bytes = writer.flush().unwrap();
    // one symbol table entry, fifty one-byte sid references
    assert!(bytes.len() < 200, "repeated names should compress, got {}", bytes.len());

    let mut reader = BinaryReader::new(&bytes);
    let ion_type = reader.next().unwrap();
    assert_eq!(read_value(&mut reader, ion_type), values[0]);
}

#[test]
fn test_name_hi_tags_scenario() {
    // {name: "hi", tags: ["a", "b"]}
    let values = vec![Annotated::plain(Value::Struct(vec![
        ("name".to_string(), Annotated::plain(Value::String("hi".to_string()))),
        (
            "tags".to_string(),
            Annotated::plain(Value::List(vec![
                Annotated::plain(Value::String("a".to_string())),
                Annotated::plain(Value::String("b".to_string())),
            ])),
        ),
    ]))];

    let mut writer = BinaryWriter::new();
    write_value(&mut writer, &values[0]);
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    assert_eq!(reader.next().unwrap(), IonType::Struct);
    assert_eq!(reader.get_container_size().unwrap(), 2);

    reader.step_into().unwrap();
    assert_eq!(reader.next().unwrap(), IonType::String);
    assert_eq!(reader.field_name().unwrap().as_deref(), Some("name"));
    assert_eq!(reader.string_value().unwrap(), "hi");

    assert_eq!(reader.next().unwrap(), IonType::List);
    assert_eq!(reader.field_name().unwrap().as_deref(), Some("tags"));
    assert_eq!(reader.get_container_size().unwrap(), 2);
    reader.step_into().unwrap();
    assert_eq!(reader.next().unwrap(), IonType::String);
    assert_eq!(reader.string_value().unwrap(), "a");
    assert_eq!(reader.next().unwrap(), IonType::String);
    assert_eq!(reader.string_value().unwrap(), "b");
    assert!(!reader.has_next().unwrap());
    reader.step_out().unwrap();
    reader.step_out().unwrap();
    assert!(!reader.has_next().unwrap());
}

#[test]
fn test_negative_zero_float_survives() {
    let mut writer = BinaryWriter::new();
    writer.write_float(-0.0).unwrap();
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    reader.next().unwrap();
    let value = reader.float_value().unwrap();
    assert!(value == 0.0 && value.is_sign_negative());
}

#[test]
fn test_symbols_resolve_after_embedded_table() {
    let mut writer = BinaryWriter::new();
    writer.start_struct().unwrap();
    writer.set_field_name("kind").unwrap();
    writer.write_symbol("measurement").unwrap();
    writer.close_struct().unwrap();
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    // the reader surfaces only the struct, never the symbol table
    assert_eq!(reader.next().unwrap(), IonType::Struct);
    reader.step_into().unwrap();
    reader.next().unwrap();
    assert_eq!(reader.field_name().unwrap().as_deref(), Some("kind"));
    assert_eq!(reader.symbol_value().unwrap(), "measurement");
    reader.step_out().unwrap();
    assert!(!reader.has_next().unwrap());

    let table = reader.symbol_table();
    assert!(table.find_by_name("kind").unwrap().is_some());
    assert!(table.find_by_name("measurement").unwrap().is_some());
}

#[test]
fn test_shared_table_import_through_catalog() {
    let shared = Arc::new(
        SymbolTable::new_shared("com.example.metrics", 2, ["host", "region", "value"]).unwrap(),
    );
    let catalog = Arc::new(Catalog::new());
    catalog.put(Arc::clone(&shared)).unwrap();

    let mut writer = BinaryWriter::new();
    writer.import_shared_table(Arc::clone(&shared)).unwrap();
    writer.start_struct().unwrap();
    writer.set_field_name("host").unwrap();
    writer.write_string("db-1").unwrap();
    writer.set_field_name("extra").unwrap();
    writer.write_int(1).unwrap();
    writer.close_struct().unwrap();
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes).with_catalog(Arc::clone(&catalog));
    assert_eq!(reader.next().unwrap(), IonType::Struct);
    reader.step_into().unwrap();
    reader.next().unwrap();
    assert_eq!(reader.field_name().unwrap().as_deref(), Some("host"));
    // "host" resolved through the import range, right above the system
    // table
    assert_eq!(reader.field_sid(), Some(10));
    assert_eq!(reader.string_value().unwrap(), "db-1");
    reader.next().unwrap();
    // "extra" is a local symbol, numbered after the import block
    assert_eq!(reader.field_name().unwrap().as_deref(), Some("extra"));
    assert_eq!(reader.field_sid(), Some(13));
    reader.step_out().unwrap();
}

#[test]
fn test_import_without_catalog_fails() {
    let shared = Arc::new(SymbolTable::new_shared("com.example.x", 1, ["s"]).unwrap());
    let mut writer = BinaryWriter::new();
    writer.import_shared_table(shared).unwrap();
    writer.write_symbol("s").unwrap();
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    assert!(reader.has_next().is_err());
}

#[test]
fn test_unknown_symbol_renders_as_sid_placeholder() {
    let mut writer = BinaryWriter::new();
    writer.write_symbol("$42").unwrap();
    let bytes = writer.flush().unwrap();

    let mut reader = BinaryReader::new(&bytes);
    reader.next().unwrap();
    assert_eq!(reader.symbol_value().unwrap(), "$42");
}

#[test]
fn test_concatenated_streams_roundtrip() {
    let first = {
        let mut writer = BinaryWriter::new();
        writer.write_symbol("only_in_first").unwrap();
        writer.flush().unwrap()
    };
    let second = {
        let mut writer = BinaryWriter::new();
        writer.write_symbol("only_in_second").unwrap();
        writer.flush().unwrap()
    };
    let mut bytes = first;
    bytes.extend_from_slice(&second);

    let mut reader = BinaryReader::new(&bytes);
    reader.next().unwrap();
    assert_eq!(reader.symbol_value().unwrap(), "only_in_first");
    reader.next().unwrap();
    assert_eq!(reader.symbol_value().unwrap(), "only_in_second");
    assert!(!reader.has_next().unwrap());
}
