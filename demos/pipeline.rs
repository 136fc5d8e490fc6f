//! # Sensor pipeline
//!
//! Demonstrates the core conflux features:
//! - A cold channel backed by a producer that only runs while observed
//! - Concurrent, order-preserving enrichment stage
//! - Debounced alerting
//! - Fault reporting through `LogWriter` and `tracing`
//!
//! Run with: `RUST_LOG=debug cargo run --example pipeline --features logging`

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use conflux::{Channel, LogWriter, Producer, ProducerError, StageConfig, Strategy};

/// Emits a synthetic temperature reading every 50ms
struct Thermometer {
    tick: u64,
}

#[async_trait]
impl Producer<f64> for Thermometer {
    async fn next(&mut self) -> Result<Option<f64>, ProducerError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.tick += 1;
        if self.tick > 40 {
            return Ok(None);
        }
        Ok(Some(20.0 + (self.tick as f64 / 3.0).sin() * 8.0))
    }

    async fn stop(&mut self) {
        println!("🌡️  Thermometer: stopped after {} ticks", self.tick);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let readings = Channel::with_producer(|| Thermometer { tick: 0 });
    let _log = LogWriter::new().attach(&readings);

    // Calibrate concurrently; results come back in reading order
    let calibrated = readings.map_async(
        StageConfig::new(Strategy::ConcurrentOrdered).with_max_concurrent(4),
        |celsius: f64| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            if celsius.is_nan() {
                return Err("sensor returned NaN");
            }
            Ok((celsius * 10.0).round() / 10.0)
        },
    );
    let _stage_log = LogWriter::new().attach(&calibrated);

    let alerts = calibrated
        .filter(|celsius| *celsius > 26.0)
        .debounce(Duration::from_millis(120));
    let _alert_sub = alerts.subscribe(|celsius| println!("🚨 Alert: {celsius}°C"));

    let mut stream = calibrated.stream();
    let mut seen = 0;
    while let Some(celsius) = stream.next().await {
        println!("📈 Reading: {celsius}°C");
        seen += 1;
        if seen == 20 {
            break;
        }
    }
    drop(stream);

    println!("✅ Done: producer running = {}", readings.is_running());
    Ok(())
}
