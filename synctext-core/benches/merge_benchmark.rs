//! Merge engine benchmarks: coalesce + LWW resolution + apply.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use synctext_core::merge_apply;
use synctext_core::update::{OpKind, UpdateExt};

fn upd(ts: u64, uid: &str, line: u32, cs: i32, old_text: &str, new_text: &str) -> UpdateExt {
    let ce = if old_text.is_empty() {
        cs
    } else {
        cs + old_text.len() as i32 - 1
    };
    UpdateExt {
        ts,
        uid: uid.to_string(),
        line,
        cs,
        ce,
        op: if old_text.is_empty() {
            OpKind::Insert
        } else {
            OpKind::Replace
        },
        old_text: old_text.to_string(),
        new_text: new_text.to_string(),
    }
}

fn bench_merge_small(c: &mut Criterion) {
    let base: Vec<String> = (0..64).map(|i| format!("line number {i} with text")).collect();
    let local: Vec<UpdateExt> = (0..5)
        .map(|i| upd(100 + i, "a", i as u32, 0, "line", "LINE"))
        .collect();
    let remote: Vec<UpdateExt> = (0..5)
        .map(|i| upd(200 + i, "b", (i + 8) as u32, 5, "number", "NUMBER"))
        .collect();

    c.bench_function("merge 5+5 updates over 64 lines", |b| {
        b.iter(|| {
            let mut lines = base.clone();
            merge_apply(
                black_box(&mut lines),
                black_box(&local),
                black_box(&remote),
                "a",
            )
        })
    });
}

fn bench_merge_conflict_heavy(c: &mut Criterion) {
    let base: Vec<String> = vec!["the quick brown fox jumps over the lazy dog".to_string()];
    // 64 peers all fighting over the same span.
    let local: Vec<UpdateExt> = (0..32)
        .map(|i| upd(1_000 + i, &format!("p{i:02}"), 0, 4, "quick", "QUICK"))
        .collect();
    let remote: Vec<UpdateExt> = (32..64)
        .map(|i| upd(1_000 + i, &format!("p{i:02}"), 0, 4, "quick", "RAPID"))
        .collect();

    c.bench_function("merge 64 overlapping updates", |b| {
        b.iter(|| {
            let mut lines = base.clone();
            merge_apply(
                black_box(&mut lines),
                black_box(&local),
                black_box(&remote),
                "p00",
            )
        })
    });
}

fn bench_coalesce_chain(c: &mut Criterion) {
    let base: Vec<String> = vec!["ab".to_string()];
    // One user typing a 40-char word one keystroke at a time.
    let mut text = String::new();
    let local: Vec<UpdateExt> = (0..40)
        .map(|i| {
            let old = text.clone();
            text.push('x');
            upd(10 + i, "typist", 0, 2, &old, &text)
        })
        .collect();

    c.bench_function("coalesce 40-link chain", |b| {
        b.iter(|| {
            let mut lines = base.clone();
            merge_apply(black_box(&mut lines), black_box(&local), &[], "typist")
        })
    });
}

criterion_group!(
    benches,
    bench_merge_small,
    bench_merge_conflict_heavy,
    bench_coalesce_chain
);
criterion_main!(benches);
