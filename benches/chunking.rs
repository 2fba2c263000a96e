use agent_lab::embeddings::chunking::RecursiveSplitter;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn sample_document() -> String {
    let paragraph = "检索增强生成（RAG）先从知识库中找出与问题相关的文本块，再把它们作为上下文交给语言模型。\
                     A recursive splitter tries paragraph breaks first, then lines, sentences and words, \
                     so chunks stay readable. 向量数据库负责保存嵌入并按相似度检索。";
    (0..200)
        .map(|i| format!("## 第{}节\n\n{}\n{}", i, paragraph, paragraph))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let content = sample_document();
    let splitter = RecursiveSplitter::default();
    c.bench_function("recursive_split_default", |b| {
        b.iter(|| splitter.split_text(black_box(&content)))
    });

    let small = RecursiveSplitter::new(120, 20).expect("valid chunk settings");
    c.bench_function("recursive_split_small_chunks", |b| {
        b.iter(|| small.split_text(black_box(&content)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
