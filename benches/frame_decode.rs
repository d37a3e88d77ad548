use askliam::core::chat_stream::decode_frame;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn make_frame(objects: usize, sse: bool) -> Vec<u8> {
    let mut frame = String::new();
    for i in 0..objects {
        if sse {
            frame.push_str("data: ");
        }
        frame.push_str(&format!(
            r#"{{"content":"token {i} lorem ipsum dolor sit amet","stop":false}}"#
        ));
        frame.push('\n');
    }
    if sse {
        frame.push_str("data: [DONE]\n");
    }
    frame.into_bytes()
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for &objects in &[1usize, 16, 256] {
        for (label, sse) in [("ndjson", false), ("sse", true)] {
            let frame = make_frame(objects, sse);
            group.throughput(Throughput::Bytes(frame.len() as u64));
            group.bench_with_input(BenchmarkId::new(label, objects), &frame, |b, frame| {
                b.iter(|| decode_frame(frame))
            });
        }
    }

    // Several objects coalesced onto one line
    let coalesced = make_frame(64, false)
        .into_iter()
        .filter(|byte| *byte != b'\n')
        .collect::<Vec<u8>>();
    group.throughput(Throughput::Bytes(coalesced.len() as u64));
    group.bench_function("coalesced_64", |b| b.iter(|| decode_frame(&coalesced)));

    group.finish();
}

criterion_group!(benches, bench_frame_decode);
criterion_main!(benches);
