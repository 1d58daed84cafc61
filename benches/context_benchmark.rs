//! Benchmarks for the per-run text handling hot paths.
//!
//! **Benchmarks Included:**
//! - `select_context`: head/tail selection for documents of 10k, 150k and 1M characters
//! - `sse_decode`: decoding a streamed completion of 2000 deltas split into network-sized chunks
//! - `extract_tags`: tag recovery from an analysis with and without a `TAGS:` line
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                       # Run all benchmarks
//! cargo bench -- select_context     # Context selection only
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use paperwatch::analysis::{extract_tags, select_context};
use paperwatch::models::SseDecoder;

const BUDGET: usize = 60_000;

fn paper_text(chars: usize) -> String {
    "Sparse attention reduces quadratic cost. Résumé des résultats. "
        .chars()
        .cycle()
        .take(chars)
        .collect()
}

fn bench_select_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_context");
    group.sample_size(20);

    for chars in [10_000usize, 150_000, 1_000_000] {
        let text = paper_text(chars);
        group.bench_with_input(BenchmarkId::from_parameter(chars), &text, |b, text| {
            b.iter(|| select_context(black_box(text), BUDGET));
        });
    }

    group.finish();
}

fn bench_sse_decode(c: &mut Criterion) {
    let mut stream = String::new();
    for i in 0..2000 {
        stream.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
        ));
    }
    stream.push_str("data: [DONE]\n\n");
    let bytes = stream.into_bytes();

    c.bench_function("sse_decode", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::new();
            let mut events = 0;
            for chunk in bytes.chunks(1400) {
                events += decoder.push(black_box(chunk)).map_or(0, |e| e.len());
            }
            events
        });
    });
}

fn bench_extract_tags(c: &mut Criterion) {
    let whitelist: Vec<String> = ["transformers", "attention", "efficiency", "vision", "nlp"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let body = paper_text(8_000);
    let with_line = format!("{body}\n\nTAGS: [\"attention\", \"efficiency\"]");

    let mut group = c.benchmark_group("extract_tags");
    group.bench_function("tags_line", |b| {
        b.iter(|| extract_tags(black_box(&with_line), &whitelist));
    });
    group.bench_function("keyword_fallback", |b| {
        b.iter(|| extract_tags(black_box(&body), &whitelist));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_select_context,
    bench_sse_decode,
    bench_extract_tags
);
criterion_main!(benches);
