use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use clap::ValueEnum;
use coal_hash::HashTable;
use coal_hash::hash::hash64;
use coal_hash::hash_table::Entry;
use log::info;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyHash {
    /// SipHash through the standard library's `DefaultHasher`.
    Sip,
    /// The crate's integer mixer.
    Mix,
    /// The key itself; sequential keys then fill home slots in order.
    Identity,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(
        short = 'l',
        long = "max_load_factor",
        default_value_t = coal_hash::DEFAULT_MAX_LOAD_FACTOR
    )]
    max_load_factor: f32,

    #[arg(long = "hash", value_enum, default_value_t = KeyHash::Sip)]
    hash: KeyHash,

    /// Fraction of the entries to erase after filling, to show the chains
    /// left behind.
    #[arg(short = 'e', long = "erase_fraction", default_value_t = 0.0)]
    erase_fraction: f64,
}

fn hash_u64(kind: KeyHash, value: u64) -> u64 {
    match kind {
        KeyHash::Sip => {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        }
        KeyHash::Mix => hash64(value),
        KeyHash::Identity => value,
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let hasher = |v: &u64| hash_u64(args.hash, *v);

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64, u64> = match HashTable::try_with_config(
        args.target_capacity,
        args.max_load_factor,
        coal_hash::Global,
    ) {
        Ok(table) => table,
        Err(error) => {
            eprintln!("cannot build table: {error}");
            std::process::exit(2);
        }
    };

    println!(
        "Actual capacity: {} ({} buckets)",
        table.capacity(),
        table.bucket_count()
    );
    println!("Filling table with u64 values...");

    let num_values = table.capacity() as u64;
    for value in 0..num_values {
        let hash = hasher(&value);
        match table.entry(hash, |&k| k == value, hasher) {
            Entry::Vacant(entry) => {
                entry.insert(value, value * 2);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }
    info!("filled {} entries", table.len());

    // Even keys first, then odd ones.
    let to_erase = (num_values as f64 * args.erase_fraction.clamp(0.0, 1.0)) as usize;
    let order = (0..num_values).step_by(2).chain((1..num_values).step_by(2));
    for value in order.take(to_erase) {
        table.remove(hasher(&value), |&k| k == value);
    }
    if to_erase > 0 {
        info!("erased {to_erase} entries");
    }

    println!("Table holds {} values", table.len());
    println!(
        "Final load factor: {:.2}% (max {:.2}%)",
        table.load_factor() * 100.0,
        table.max_load_factor() * 100.0
    );

    table.print_chain_histogram(hasher);
    table.debug_stats(hasher).print();
}
