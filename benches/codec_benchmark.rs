// SPDX-License-Identifier: MIT
//! Encode/decode benchmarks over a representative record stream

use criterion::{criterion_group, criterion_main, Criterion};
use ion_codec::{BinaryReader, BinaryWriter};
use std::hint::black_box;

fn write_records(count: i64) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    for i in 0..count {
        writer.start_struct().unwrap();
        writer.set_field_name("id").unwrap();
        writer.write_int(i).unwrap();
        writer.set_field_name("host").unwrap();
        writer.write_symbol("db-primary").unwrap();
        writer.set_field_name("message").unwrap();
        writer.write_string("request completed").unwrap();
        writer.set_field_name("samples").unwrap();
        writer.start_list().unwrap();
        writer.write_int(i * 3).unwrap();
        writer.write_int(i * 5).unwrap();
        writer.close_list().unwrap();
        writer.close_struct().unwrap();
    }
    writer.flush().unwrap()
}

fn benchmark_encode(c: &mut Criterion) {
    c.bench_function("encode_1k_records", |b| {
        b.iter(|| black_box(write_records(black_box(1_000))))
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let bytes = write_records(1_000);

    c.bench_function("decode_1k_records", |b| {
        b.iter(|| {
            let mut reader = BinaryReader::new(black_box(&bytes));
            let mut total = 0i64;
            while reader.has_next().unwrap() {
                reader.next().unwrap();
                reader.step_into().unwrap();
                while reader.has_next().unwrap() {
                    use ion_codec::IonType;
                    match reader.next().unwrap() {
                        IonType::Int => total += reader.int_value().unwrap(),
                        IonType::List => {
                            reader.step_into().unwrap();
                            while reader.has_next().unwrap() {
                                reader.next().unwrap();
                                total += reader.int_value().unwrap();
                            }
                            reader.step_out().unwrap();
                        }
                        _ => {}
                    }
                }
                reader.step_out().unwrap();
            }
            black_box(total)
        })
    });
}

fn benchmark_skip_scan(c: &mut Criterion) {
    let bytes = write_records(1_000);

    c.bench_function("skip_scan_1k_records", |b| {
        b.iter(|| {
            let mut reader = BinaryReader::new(black_box(&bytes));
            let mut count = 0usize;
            while reader.has_next().unwrap() {
                reader.next().unwrap();
                count += reader.get_container_size().unwrap();
            }
            black_box(count)
        })
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode, benchmark_skip_scan);
criterion_main!(benches);
