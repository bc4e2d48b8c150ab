use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use phonebook::{contact::ContactDraft, core::store::ContactStore};

fn draft(i: u64) -> ContactDraft {
    ContactDraft::new(format!("Contact {i}"), format!("09-{:07}", 1_000_000 + i))
}

fn filled_store(n: u64) -> ContactStore {
    let mut store = ContactStore::new();
    for i in 0..n {
        store.create(draft(i)).expect("create");
    }
    store.drain_pending_ops();
    store
}

fn bench_creates(c: &mut Criterion) {
    c.bench_function("store_create_50k", |b| {
        b.iter(|| filled_store(50_000));
    });
}

fn bench_updates(c: &mut Criterion) {
    c.bench_function("store_update_10k", |b| {
        b.iter(|| {
            let mut store = filled_store(10_000);
            for i in 0..10_000u64 {
                store
                    .update(i + 1, ContactDraft::new(format!("Renamed {i}"), "040-7654321"))
                    .expect("update");
            }
        });
    });
}

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("reads");

    for n in [100u64, 1_000, 50_000] {
        let store = filled_store(n);
        group.bench_with_input(BenchmarkId::new("list_cloned", n), &store, |b, store| {
            b.iter(|| store.list_cloned());
        });
        group.bench_with_input(BenchmarkId::new("find_by_name", n), &store, |b, store| {
            let lookup = format!("CONTACT {}", n / 2);
            b.iter(|| store.find_by_name(&lookup).map(|c| c.id));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_creates, bench_updates, bench_reads);
criterion_main!(benches);
