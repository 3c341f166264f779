//! Transformation throughput benchmarks
//!
//! Measures:
//! - Stylesheet compilation (compile + compose)
//! - Single-document runs over growing inputs (10 to 1000 rows)
//! - Key-based lookups, where the index is built once per run
//! - Batch runs sharing one compiled stylesheet across threads
//!
//! Run benchmarks: `cargo bench --bench transform_throughput`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use weft::{BatchTransformer, Transformer, compile_stylesheet};

const REPORT_XSLT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:key name="by-group" match="row" use="@group"/>
    <xsl:template match="/">
        <table>
            <xsl:apply-templates select="data/row">
                <xsl:sort select="@value" data-type="number" order="descending"/>
            </xsl:apply-templates>
        </table>
    </xsl:template>
    <xsl:template match="row">
        <xsl:variable name="peers" select="count(key('by-group', @group))"/>
        <tr class="{@group}">
            <td><xsl:value-of select="position()"/></td>
            <td><xsl:value-of select="format-number(@value, '#,##0.00')"/></td>
            <td><xsl:value-of select="$peers"/></td>
        </tr>
    </xsl:template>
</xsl:stylesheet>"#;

fn generate_rows(count: usize) -> String {
    let rows: String = (0..count)
        .map(|i| format!(r#"<row group="g{}" value="{}">Row {}</row>"#, i % 7, (i * 37) % 1000, i))
        .collect();
    format!("<data>{}</data>", rows)
}

fn benchmark_compile(c: &mut Criterion) {
    c.bench_function("compile_report_stylesheet", |b| {
        b.iter(|| compile_stylesheet(black_box(REPORT_XSLT)).expect("Failed to compile stylesheet"))
    });
}

fn benchmark_document_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_size");
    let transformer = Transformer::new(compile_stylesheet(REPORT_XSLT).expect("Failed to compile stylesheet"));

    for count in [10, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        let xml = generate_rows(count);
        group.bench_with_input(BenchmarkId::new("rows", count), &xml, |b, xml| {
            b.iter(|| {
                transformer
                    .transform_to_fragment(black_box(xml))
                    .expect("Failed to transform")
            })
        });
    }
    group.finish();
}

fn benchmark_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let transformer = Transformer::new(compile_stylesheet(REPORT_XSLT).expect("Failed to compile stylesheet"));
    let documents: Vec<String> = (0..64).map(|_| generate_rows(100)).collect();

    for threads in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(documents.len() as u64));
        let batch = BatchTransformer::new(transformer.clone()).with_threads(threads);
        group.bench_with_input(BenchmarkId::new("threads", threads), &documents, |b, documents| {
            b.iter(|| batch.transform_all(black_box(documents)))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_document_size, benchmark_batch);
criterion_main!(benches);
