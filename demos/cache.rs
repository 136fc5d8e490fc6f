//! # Recent-values cache
//!
//! Demonstrates:
//! - Size- and TTL-bounded retention
//! - Replay to late subscribers
//! - Reason-tagged eviction notifications
//!
//! Run with: `cargo run --example cache`

use std::time::Duration;

use anyhow::Result;

use conflux::{CacheConfig, Channel, DropStrategy};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let orders = Channel::<String>::new();
    let recent = orders.cache(
        CacheConfig::default()
            .with_size(3)
            .with_ttl(Duration::from_millis(200))
            .with_drop_strategy(DropStrategy::Oldest)
            .with_initial_values(["warmup".to_string()]),
    );

    let _evictions = recent
        .evicted()
        .subscribe(|e| println!("🗑️  Evicted {:?} ({})", e.value, e.reason));

    for id in 1..=4 {
        orders.submit(format!("order-{id}"));
    }
    println!("📦 Cached: {:?}", recent.values());

    // A late subscriber first sees everything retained, then live values
    let _late = recent.subscribe(|order| println!("👀 Late subscriber: {order}"));
    orders.submit("order-5".to_string());

    tokio::time::sleep(Duration::from_millis(250)).await;
    println!("⌛ After TTL: {:?} (empty = {})", recent.values(), recent.is_empty());

    orders.submit("order-6".to_string());
    recent.clear();
    println!("🧹 After clear: {:?}", recent.values());
    Ok(())
}
