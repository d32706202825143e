use core::hash::Hash;
use core::hash::Hasher;
use core::hint::black_box;

use coal_hash::HashTable as CoalHashTable;
use coal_hash::hash_table::Entry as CoalEntry;
use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::hash_table::Entry as HashbrownEntry;
use hashbrown::hash_table::HashTable as HashbrownHashTable;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;
use siphasher::sip::SipHasher;

/// Key and value shapes the benchmarks are run with.
trait Workload {
    type Key: Clone + Eq + Hash;
    type Value: Clone;

    fn make(key: u64) -> (Self::Key, Self::Value);
}

fn sip<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = SipHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

struct SmallKeys;

impl Workload for SmallKeys {
    type Key = u64;
    type Value = u64;

    fn make(key: u64) -> (u64, u64) {
        black_box((key, key))
    }
}

struct StringKeys;

impl Workload for StringKeys {
    type Key = String;
    type Value = u64;

    fn make(key: u64) -> (String, u64) {
        black_box((format!("key_{key:016X}"), key))
    }
}

struct LargeValues;

impl Workload for LargeValues {
    type Key = String;
    type Value = [u8; 256];

    fn make(key: u64) -> (String, [u8; 256]) {
        let mut value = [0u8; 256];
        for (i, byte) in value.iter_mut().enumerate() {
            *byte = (key >> ((i % 8) * 8)) as u8;
        }
        black_box((format!("key_{key:064b}"), value))
    }
}

type Prepared<W> = Vec<(u64, <W as Workload>::Key, <W as Workload>::Value)>;

fn prepare<W: Workload>(keys: impl Iterator<Item = u64>) -> Prepared<W> {
    keys.map(|key| {
        let (k, v) = W::make(key);
        (sip(&k), k, v)
    })
    .collect()
}

fn coal_filled<W: Workload>(items: &Prepared<W>) -> CoalHashTable<W::Key, W::Value> {
    let mut table = CoalHashTable::with_capacity(0);
    for (hash, key, value) in items.iter().cloned() {
        table.insert_unique(hash, key, value, |k| sip(k));
    }
    table
}

fn hashbrown_filled<W: Workload>(items: &Prepared<W>) -> HashbrownHashTable<(W::Key, W::Value)> {
    let mut table = HashbrownHashTable::with_capacity(0);
    for (hash, key, value) in items.iter().cloned() {
        table.insert_unique(hash, (key, value), |(k, _)| sip(k));
    }
    table
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
    (1 << 18),
];

fn bench_insert_random<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "insert_random_{}",
        core::any::type_name::<W>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = OsRng;

    for &size in SIZES[..=MAX_SIZE].iter() {
        let items = prepare::<W>((0..size).map(|_| rng.try_next_u64().unwrap()));
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("coal_hash", |b| {
            b.iter_batched(
                || {
                    let mut items = items.clone();
                    items.shuffle(&mut SmallRng::from_os_rng());
                    items
                },
                |items| {
                    let mut table = CoalHashTable::<W::Key, W::Value>::with_capacity(0);
                    for (hash, key, value) in items {
                        match table.entry(hash, |k| *k == key, |k| sip(k)) {
                            CoalEntry::Vacant(entry) => {
                                black_box(entry.insert(key, value));
                            }
                            CoalEntry::Occupied(mut entry) => *entry.get_mut() = value,
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || {
                    let mut items = items.clone();
                    items.shuffle(&mut SmallRng::from_os_rng());
                    items
                },
                |items| {
                    let mut table = HashbrownHashTable::<(W::Key, W::Value)>::with_capacity(0);
                    for (hash, key, value) in items {
                        match table.entry(hash, |(k, _)| *k == key, |(k, _)| sip(k)) {
                            HashbrownEntry::Vacant(entry) => {
                                black_box(entry.insert((key, value)));
                            }
                            HashbrownEntry::Occupied(mut entry) => entry.get_mut().1 = value,
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit_miss<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "find_hit_miss_{}",
        core::any::type_name::<W>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let present = prepare::<W>(0..size as u64);
        let mut probes = prepare::<W>(0..size as u64 * 2);
        probes.shuffle(&mut SmallRng::seed_from_u64(size as u64));

        let coal = coal_filled::<W>(&present);
        let hashbrown = hashbrown_filled::<W>(&present);
        group.throughput(Throughput::Elements(probes.len() as u64));

        group.bench_function("coal_hash", |b| {
            b.iter(|| {
                for (hash, key, _) in &probes {
                    black_box(coal.find(*hash, |k| k == key));
                }
            })
        });

        group.bench_function("hashbrown", |b| {
            b.iter(|| {
                for (hash, key, _) in &probes {
                    black_box(hashbrown.find(*hash, |(k, _)| k == key));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("remove_{}", core::any::type_name::<W>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let items = prepare::<W>(0..size as u64);
        let mut order = items.clone();
        order.shuffle(&mut SmallRng::seed_from_u64(size as u64));
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("coal_hash", |b| {
            b.iter_batched(
                || coal_filled::<W>(&items),
                |mut table| {
                    for (hash, key, _) in &order {
                        black_box(table.remove(*hash, |k| k == key));
                    }
                    black_box(table)
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || hashbrown_filled::<W>(&items),
                |mut table| {
                    for (hash, key, _) in &order {
                        if let Ok(entry) = table.find_entry(*hash, |(k, _)| k == key) {
                            black_box(entry.remove().0);
                        }
                    }
                    black_box(table)
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_iteration<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("iteration_{}", core::any::type_name::<W>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let items = prepare::<W>(0..size as u64);
        let coal = coal_filled::<W>(&items);
        let hashbrown = hashbrown_filled::<W>(&items);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function("coal_hash", |b| {
            b.iter(|| {
                for entry in coal.iter() {
                    black_box(entry);
                }
            })
        });

        group.bench_function("hashbrown", |b| {
            b.iter(|| {
                for entry in hashbrown.iter() {
                    black_box(entry);
                }
            })
        });
    }

    group.finish();
}

#[derive(Clone, Copy)]
enum Operation {
    Find,
    Insert,
    Remove,
}

fn bench_mixed_zipf<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    for exponent in [1.0, 1.3] {
        let mut group = c.benchmark_group(format!(
            "mixed_zipf_{:.01}_{}",
            exponent,
            core::any::type_name::<W>()
        ));
        group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

        for &size in SIZES[..=MAX_SIZE].iter() {
            let mut rng = SmallRng::from_os_rng();
            let op_distr = Zipf::new(3.0, exponent).unwrap();
            let key_distr = Zipf::new(size as f64 * 2.0, 1.0).unwrap();

            let operations = (0..size * 3)
                .map(|_| {
                    let op = match rng.sample(op_distr) {
                        x if x <= 1.0 => Operation::Find,
                        x if x <= 2.0 => Operation::Insert,
                        _ => Operation::Remove,
                    };
                    let (key, value) = W::make(rng.sample(key_distr) as u64);
                    (op, sip(&key), key, value)
                })
                .collect::<Vec<_>>();
            group.throughput(Throughput::Elements(operations.len() as u64));

            group.bench_function("coal_hash", |b| {
                b.iter_batched(
                    || operations.clone(),
                    |operations| {
                        let mut table = CoalHashTable::<W::Key, W::Value>::with_capacity(0);
                        for (op, hash, key, value) in operations {
                            match op {
                                Operation::Find => {
                                    black_box(table.find(hash, |k| *k == key));
                                }
                                Operation::Insert => {
                                    match table.entry(hash, |k| *k == key, |k| sip(k)) {
                                        CoalEntry::Vacant(entry) => {
                                            black_box(entry.insert(key, value));
                                        }
                                        CoalEntry::Occupied(mut entry) => {
                                            *entry.get_mut() = value;
                                        }
                                    }
                                }
                                Operation::Remove => {
                                    black_box(table.remove(hash, |k| *k == key));
                                }
                            }
                        }
                        black_box(table)
                    },
                    BatchSize::SmallInput,
                )
            });

            group.bench_function("hashbrown", |b| {
                b.iter_batched(
                    || operations.clone(),
                    |operations| {
                        let mut table = HashbrownHashTable::<(W::Key, W::Value)>::with_capacity(0);
                        for (op, hash, key, value) in operations {
                            match op {
                                Operation::Find => {
                                    black_box(table.find(hash, |(k, _)| *k == key));
                                }
                                Operation::Insert => {
                                    match table.entry(hash, |(k, _)| *k == key, |(k, _)| sip(k)) {
                                        HashbrownEntry::Vacant(entry) => {
                                            black_box(entry.insert((key, value)));
                                        }
                                        HashbrownEntry::Occupied(mut entry) => {
                                            entry.get_mut().1 = value;
                                        }
                                    }
                                }
                                Operation::Remove => {
                                    if let Ok(entry) = table.find_entry(hash, |(k, _)| *k == key) {
                                        black_box(entry.remove().0);
                                    }
                                }
                            }
                        }
                        black_box(table)
                    },
                    BatchSize::SmallInput,
                )
            });
        }

        group.finish();
    }
}

fn bench_churn<W: Workload, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<W>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        // Every key appears twice: the first visit inserts, the second erases.
        let mut toggles = prepare::<W>((0..size as u64).flat_map(|k| [k, k]));
        toggles.shuffle(&mut SmallRng::seed_from_u64(size as u64));
        group.throughput(Throughput::Elements(toggles.len() as u64));

        group.bench_function("coal_hash", |b| {
            b.iter_batched(
                || toggles.clone(),
                |toggles| {
                    let mut table = CoalHashTable::<W::Key, W::Value>::with_capacity(0);
                    for (hash, key, value) in toggles {
                        match table.entry(hash, |k| *k == key, |k| sip(k)) {
                            CoalEntry::Vacant(entry) => {
                                entry.insert(key, value);
                            }
                            CoalEntry::Occupied(entry) => {
                                black_box(entry.remove());
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function("hashbrown", |b| {
            b.iter_batched(
                || toggles.clone(),
                |toggles| {
                    let mut table = HashbrownHashTable::<(W::Key, W::Value)>::with_capacity(0);
                    for (hash, key, value) in toggles {
                        match table.entry(hash, |(k, _)| *k == key, |(k, _)| sip(k)) {
                            HashbrownEntry::Vacant(entry) => {
                                entry.insert((key, value));
                            }
                            HashbrownEntry::Occupied(entry) => {
                                black_box(entry.remove().0);
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_map_insert_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert_get_u64");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES {
        let mut keys = (0..size as u64).collect::<Vec<_>>();
        keys.shuffle(&mut SmallRng::seed_from_u64(7));
        group.throughput(Throughput::Elements(size as u64 * 2));

        group.bench_function(format!("coal_hash/{size}"), |b| {
            b.iter(|| {
                let mut map = coal_hash::HashMap::<u64, u64>::new();
                for &k in &keys {
                    map.insert(k, k);
                }
                for &k in &keys {
                    black_box(map.get(&k));
                }
                black_box(map)
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                let mut map = hashbrown::HashMap::<u64, u64>::new();
                for &k in &keys {
                    map.insert(k, k);
                }
                for &k in &keys {
                    black_box(map.get(&k));
                }
                black_box(map)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_random::<SmallKeys, 4>,
    bench_insert_random::<StringKeys, 4>,
    bench_insert_random::<LargeValues, 2>,
    bench_find_hit_miss::<SmallKeys, 4>,
    bench_find_hit_miss::<StringKeys, 4>,
    bench_find_hit_miss::<LargeValues, 2>,
    bench_remove::<SmallKeys, 4>,
    bench_remove::<StringKeys, 4>,
    bench_remove::<LargeValues, 2>,
    bench_iteration::<SmallKeys, 4>,
    bench_iteration::<StringKeys, 4>,
    bench_iteration::<LargeValues, 2>,
    bench_mixed_zipf::<SmallKeys, 4>,
    bench_mixed_zipf::<StringKeys, 4>,
    bench_mixed_zipf::<LargeValues, 2>,
    bench_churn::<SmallKeys, 4>,
    bench_churn::<StringKeys, 4>,
    bench_churn::<LargeValues, 2>,
    bench_map_insert_get,
);

criterion_main!(benches);
