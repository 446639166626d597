//! Benchmarks the stream cipher inner loops, replacing the original
//! `encryption.py` `__main__` timing harness.

use std::io::{Cursor, Write};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dni_crypto::{CipherKey, CipherWriter, Encryption};

fn bench_encrypt(c: &mut Criterion) {
    let data = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 0].repeat(50_000);
    let mut group = c.benchmark_group("encrypt");

    for (name, encryption, key) in [
        ("xtea", Encryption::Xtea, CipherKey::default()),
        (
            "btea",
            Encryption::Btea,
            CipherKey::from_hex("31415926535897932384626433832795").unwrap(),
        ),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| {
                let mut out = Cursor::new(Vec::with_capacity(data.len() + 16));
                let mut writer = CipherWriter::create(&mut out, encryption, key).unwrap();
                writer.write_all(data).unwrap();
                writer.finish().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encrypt);
criterion_main!(benches);
