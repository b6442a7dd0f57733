//! Benchmarks for sequence point processing and symbol emission.
//!
//! - Collecting a long marker stream into a table
//! - Encoding a table into its Portable PDB blob
//! - Emitting and finalizing a compilation of many methods

extern crate dotpdb;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use dotpdb::{
    emit::{EmitOptions, MethodDebugBody, SymbolWriter},
    metadata::{
        documents::{DocumentId, DocumentRegistry, HashAlgorithm, SourceEncoding, SourceText},
        importscope::ImportScopeRegistry,
        sequencepoints::{
            encode_sequence_points, SequenceMarker, SequencePointCollector, SourceSpan,
        },
        token::Token,
    },
    utils::CancellationToken,
};

/// One statement per line, a hidden point every tenth statement.
fn markers(document: DocumentId, count: u32) -> Vec<(u32, SequenceMarker)> {
    (0..count)
        .map(|i| {
            let marker = if i % 10 == 9 {
                SequenceMarker::Hidden
            } else {
                SequenceMarker::Visible(SourceSpan::new(document, i + 1, 9, i + 1, 40))
            };
            (i * 3, marker)
        })
        .collect()
}

fn bench_collect(c: &mut Criterion) {
    let stream = markers(DocumentId::from_raw(1), 10_000);

    c.bench_function("sequence_points_collect_10k", |b| {
        b.iter(|| {
            let table = SequencePointCollector::collect(black_box(stream.clone())).unwrap();
            black_box(table)
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let table = SequencePointCollector::collect(markers(DocumentId::from_raw(1), 10_000)).unwrap();

    c.bench_function("sequence_points_encode_10k", |b| {
        b.iter(|| {
            let blob = encode_sequence_points(black_box(&table), 0, true, &|_| Some(1)).unwrap();
            black_box(blob)
        });
    });
}

fn bench_emit(c: &mut Criterion) {
    c.bench_function("emit_portable_1000_methods", |b| {
        b.iter(|| {
            let documents = Arc::new(DocumentRegistry::new());
            let text = SourceText::new("class C {}", SourceEncoding::Utf8 { bom: true });
            let doc = documents
                .register("/src/C.cs", &text, HashAlgorithm::Sha256)
                .unwrap();

            let writer = SymbolWriter::new(
                EmitOptions::default().with_deterministic(true),
                documents,
                ImportScopeRegistry::new(),
            )
            .unwrap();
            let bodies = (1..=1000)
                .map(|row| {
                    MethodDebugBody::new(Token::method_def(row), 60)
                        .with_markers(markers(doc, 20))
                })
                .collect();
            writer
                .emit_methods(bodies, &CancellationToken::new())
                .unwrap();
            black_box(writer.finalize().unwrap())
        });
    });
}

criterion_group!(benches, bench_collect, bench_encode, bench_emit);
criterion_main!(benches);
