//! Replica engine benchmarks
//!
//! ## Benchmark Groups
//!
//! - `replica_apply/*`: event fold including index maintenance
//! - `replica_read/*`: point reads and index lookups on a populated replica
//! - `snapshot/*`: single and coordinated multi-replica capture, by size
//!
//! ## Deterministic Randomness
//!
//! Key selection uses a fixed seed (BENCH_SEED) so runs are comparable.
//!
//! ## Running
//!
//! ```bash
//! cargo bench -p configstore-storage --bench replica_benchmarks
//! cargo bench -p configstore-storage --bench replica_benchmarks -- "snapshot"
//! ```

use configstore_core::hash::hash64_str;
use configstore_core::{ChangeEvent, Entity, EntityKey, PartitionId};
use configstore_storage::{FieldSource, IndexDef, Replica, SnapshotCoordinator};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

#[derive(Debug, Clone, PartialEq)]
struct Device {
    key: EntityKey,
    serial: String,
    owner: String,
}

impl Entity for Device {
    const KIND: &'static str = "Device";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Site {
    key: EntityKey,
    name: String,
}

impl Entity for Site {
    const KIND: &'static str = "Site";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

fn serial(d: &Device) -> Option<&[u8]> {
    Some(d.serial.as_bytes())
}

fn owner(d: &Device) -> Option<&[u8]> {
    Some(d.owner.as_bytes())
}

fn device(i: usize) -> Device {
    Device {
        key: EntityKey::named(PartitionId::default(), Device::KIND, format!("dev-{i:07}")),
        serial: format!("SN{i:09}"),
        owner: format!("owner-{}", i % 100),
    }
}

fn device_replica() -> Replica<Device> {
    Replica::builder()
        .index(IndexDef::field64("by_serial", FieldSource::bytes(serial)))
        .index(IndexDef::pair64(
            "by_owner_serial",
            FieldSource::bytes(owner),
            FieldSource::bytes(serial),
        ))
        .build()
}

fn populated(n: usize) -> Replica<Device> {
    let replica = device_replica();
    replica.apply_batch((0..n).map(|i| ChangeEvent::created(device(i))));
    replica
}

// =============================================================================
// Apply
// =============================================================================

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("replica_apply");
    group.throughput(Throughput::Elements(1));

    group.bench_function("created_fresh", |b| {
        let replica = device_replica();
        let mut i = 0usize;
        b.iter(|| {
            replica.apply(ChangeEvent::created(device(i)));
            i += 1;
        });
    });

    group.bench_function("updated_reindex", |b| {
        let replica = populated(10_000);
        let mut rng = StdRng::seed_from_u64(BENCH_SEED);
        let mut version = 0u64;
        b.iter(|| {
            let mut d = device(rng.gen_range(0..10_000));
            d.serial = format!("SN-v{version}");
            version += 1;
            replica.apply(ChangeEvent::updated(d));
        });
    });

    group.bench_function("deleted_absent", |b| {
        let replica = populated(1_000);
        let ghost = device(1_000_000);
        b.iter(|| replica.apply(ChangeEvent::deleted(black_box(ghost.clone()))));
    });

    group.finish();
}

// =============================================================================
// Reads
// =============================================================================

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("replica_read");
    let replica = populated(100_000);
    let keys: Vec<EntityKey> = (0..1_000).map(|i| device(i * 97).key).collect();
    let hashes: Vec<u64> = (0..1_000)
        .map(|i| hash64_str(&format!("SN{:09}", i * 97)))
        .collect();

    group.bench_function("get_uniform", |b| {
        let mut rng = StdRng::seed_from_u64(BENCH_SEED);
        b.iter(|| black_box(replica.get(&keys[rng.gen_range(0..keys.len())])));
    });

    group.bench_function("lookup_uniform", |b| {
        let mut rng = StdRng::seed_from_u64(BENCH_SEED);
        b.iter(|| black_box(replica.lookup("by_serial", hashes[rng.gen_range(0..hashes.len())])));
    });

    group.bench_function("lookup_miss", |b| {
        let miss = hash64_str("no-such-serial");
        b.iter(|| black_box(replica.lookup("by_serial", miss)));
    });

    group.finish();
}

// =============================================================================
// Snapshots
// =============================================================================

fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let coordinator = SnapshotCoordinator::default();

    for size in [1_000usize, 10_000, 100_000] {
        let devices = populated(size);
        let sites = Replica::<Site>::new();
        sites.apply_batch((0..100).map(|i| {
            ChangeEvent::created(Site {
                key: EntityKey::named(PartitionId::default(), Site::KIND, format!("site-{i}")),
                name: format!("Site {i}"),
            })
        }));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("single", size), &size, |b, _| {
            b.iter(|| black_box(coordinator.take_snapshot(&devices)));
        });
        group.bench_with_input(BenchmarkId::new("multi", size), &size, |b, _| {
            b.iter(|| black_box(coordinator.take_snapshots(&[&devices, &sites])));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_apply, bench_reads, bench_snapshots);
criterion_main!(benches);
