use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use vassago_stream::StreamRegistry;

const PAYLOAD: usize = 64 * 1024;

fn bench_read_paths(c: &mut Criterion) {
    let data = vec![0xA5u8; PAYLOAD];
    let mut group = c.benchmark_group("read");
    group.throughput(criterion::Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("per_byte", |b| {
        b.iter_batched(
            || {
                let mut reg = StreamRegistry::new();
                let id = reg.open_memory_transient(data.clone());
                (reg, id)
            },
            |(mut reg, id)| {
                let mut sum = 0u64;
                while let Some(byte) = reg.read_byte(id).unwrap() {
                    sum += byte as u64;
                }
                black_box(sum)
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("bulk", |b| {
        b.iter_batched(
            || {
                let mut reg = StreamRegistry::new();
                let id = reg.open_memory_transient(data.clone());
                (reg, id)
            },
            |(mut reg, id)| {
                let mut out = vec![0u8; PAYLOAD];
                reg.read(id, &mut out).unwrap();
                black_box(out)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_read_paths);
criterion_main!(benches);
