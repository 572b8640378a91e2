use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quadstore::config::StoreConfig;
use quadstore::engine::{EmbeddedBackend, GraphSelector, Lexicon, QuadBackend, QuadDescriptor, QuadIndex, QuadPattern, TermDescriptor};
use quadstore::rdf::{Literal, NamedNode, RdfPredicate, Triple};
use quadstore::store::{create, Store};
use tokio::runtime::Runtime;

fn triples(size: usize) -> Vec<Triple> {
    (0..size)
        .map(|i| {
            Triple::new(
                NamedNode::new_unchecked(format!("http://example.org/person/{}", i)).into(),
                RdfPredicate::from(NamedNode::new_unchecked("http://xmlns.com/foaf/0.1/age")),
                Literal::new_simple_literal((i % 100).to_string()).into(),
            )
        })
        .collect()
}

fn quad(i: usize) -> QuadDescriptor {
    QuadDescriptor::new(
        TermDescriptor::uri(format!("http://example.org/person/{}", i)),
        TermDescriptor::uri("http://xmlns.com/foaf/0.1/knows"),
        TermDescriptor::uri(format!("http://example.org/person/{}", (i * 7) % 1000)),
        None,
    )
}

async fn populated(size: usize) -> Store {
    let store = create(StoreConfig::default()).await.unwrap();
    store.insert(&triples(size), None).await.unwrap();
    store
}

/// Benchmark INSERT DATA throughput through the facade
fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("insert");

    for size in [100, 1000].iter() {
        let data = triples(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let store = create(StoreConfig::default()).await.unwrap();
                    store.insert(&data, None).await.unwrap();
                })
            });
        });
    }
    group.finish();
}

/// Benchmark SELECT with a FILTER over a populated store
fn bench_select(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("select");

    for size in [1000, 10_000].iter() {
        let store = rt.block_on(populated(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(store.execute(
                    "SELECT ?s WHERE { ?s <http://xmlns.com/foaf/0.1/age> ?age FILTER(?age = \"42\") }",
                ))
                .unwrap()
            });
        });
    }
    group.finish();
}

/// Benchmark pattern lookups on the embedded backend
fn bench_index_match(c: &mut Criterion) {
    let mut backend = EmbeddedBackend::new(Lexicon::new(), QuadIndex::default());
    for i in 0..10_000 {
        backend.insert(&quad(i)).unwrap();
    }

    c.bench_function("index_match_subject", |b| {
        let mut pattern = QuadPattern::any(GraphSelector::Default);
        pattern.subject = Some(TermDescriptor::uri("http://example.org/person/4242"));
        b.iter(|| backend.match_pattern(&pattern).unwrap());
    });
}

criterion_group!(benches, bench_insert, bench_select, bench_index_match);
criterion_main!(benches);
