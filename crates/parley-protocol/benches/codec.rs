use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley_protocol::{codec, ServerFrame, UserSummary};

fn bench_encode(c: &mut Criterion) {
    let frame = ServerFrame::Message {
        username: "alice".into(),
        user_id: 1,
        message: "Hello, world!".into(),
        timestamp: "2024-05-01T12:00:00.000Z".into(),
    };

    c.bench_function("encode_message", |b| {
        b.iter(|| codec::encode(black_box(&frame)).unwrap())
    });

    let roster = ServerFrame::user_list(
        (0..100)
            .map(|id| UserSummary {
                id,
                username: format!("user-{id}"),
            })
            .collect(),
    );

    c.bench_function("encode_user_list_100", |b| {
        b.iter(|| codec::encode(black_box(&roster)).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let data = br#"{"type":"message","message":"Hello, world!"}"#;

    c.bench_function("decode_message", |b| {
        b.iter(|| codec::decode(black_box(data)).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
