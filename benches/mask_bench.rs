use criterion::{Criterion, criterion_group, criterion_main};
use lexprobe::mask::MaskRegistry;

fn bench_mask_apply_few_keywords(c: &mut Criterion) {
    let registry = MaskRegistry::new();
    registry.add("sensitive");
    registry.add("classified");
    let text = "this is a long paragraph containing a sensitive term and a classified term \
        repeated a few times for good measure, sensitive classified sensitive";

    c.bench_function("mask_apply_few_keywords", |b| b.iter(|| registry.apply(text)));
}

fn bench_mask_apply_many_keywords(c: &mut Criterion) {
    let registry = MaskRegistry::new();
    for i in 0..200 {
        registry.add(format!("keyword{i}"));
    }
    let text = "a benign paragraph with keyword42 and keyword7 and keyword199 scattered \
        throughout an otherwise unremarkable chunk of text that a scan would chunk through";

    c.bench_function("mask_apply_many_keywords", |b| b.iter(|| registry.apply(text)));
}

fn bench_mask_apply_no_match(c: &mut Criterion) {
    let registry = MaskRegistry::new();
    registry.add("nowhere-to-be-found");
    let text = "a completely unrelated sentence that never mentions the registered keyword";

    c.bench_function("mask_apply_no_match", |b| b.iter(|| registry.apply(text)));
}

criterion_group!(
    benches,
    bench_mask_apply_few_keywords,
    bench_mask_apply_many_keywords,
    bench_mask_apply_no_match
);
criterion_main!(benches);
