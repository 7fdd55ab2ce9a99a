/// Benchmarks for envelope parsing on the inbound hot path: every text frame a
/// `LiveFeed` receives goes through `parse_envelopes` before fan-out.
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use realtime_link::feed::{Envelope, parse_envelopes};

fn bench_single_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed/single_envelope");

    let balance = r#"{
        "type": "balance",
        "payload": {"account": "checking", "amount": "1520.33", "currency": "USD"}
    }"#;
    group.throughput(Throughput::Bytes(balance.len() as u64));
    group.bench_function("balance", |b| {
        b.iter(|| {
            let _: Vec<Envelope> = parse_envelopes(std::hint::black_box(balance.as_bytes()))
                .expect("Parsing should succeed");
        });
    });

    let keepalive = "   ";
    group.bench_function("keepalive", |b| {
        b.iter(|| {
            let _: Vec<Envelope> = parse_envelopes(std::hint::black_box(keepalive.as_bytes()))
                .expect("Parsing should succeed");
        });
    });

    group.finish();
}

fn bench_batched_envelopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed/batched_envelopes");

    for size in [10_usize, 100, 1000] {
        let batch = format!(
            "[{}]",
            (0..size)
                .map(|i| format!(
                    r#"{{"type":"transaction","payload":{{"id":"t-{i}","amount":"{i}.00","merchant":"Coffee Co"}}}}"#
                ))
                .collect::<Vec<_>>()
                .join(",")
        );

        group.throughput(Throughput::Bytes(batch.len() as u64));
        group.bench_function(format!("transactions_{size}"), |b| {
            b.iter(|| {
                let _: Vec<Envelope> = parse_envelopes(std::hint::black_box(batch.as_bytes()))
                    .expect("Parsing should succeed");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_envelope, bench_batched_envelopes);
criterion_main!(benches);
