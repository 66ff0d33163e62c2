use criterion::{criterion_group, criterion_main, Criterion};
use search_core::tokenizer::{default_stop_words, tokenize};

const TEXT: &str = "<html><body><h1>Machine learning</h1><p>Machine learning is a subset of \
artificial intelligence. Machine learning algorithms build models based on training data, \
and deep learning is a type of machine learning based on neural networks.</p></body></html>";

fn bench_tokenize(c: &mut Criterion) {
    let stops = default_stop_words();
    let text = TEXT.repeat(50);
    c.bench_function("tokenize_page", |b| b.iter(|| tokenize(&text, &stops)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
