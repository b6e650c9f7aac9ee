//! A counter with two derived views, driven one turn at a time.
//!
//! Run with `RUST_LOG=ripple_core=trace` to watch requests being queued,
//! coalesced and served from the cache.

use ripple_core::reactive::{read_untracked, Purity, Runtime};
use ripple_core::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::new();
    let counter = runtime.signal(0i64);

    let c = counter.clone();
    let doubled = runtime.derive(Purity::Pure, move || c.get() * 2);

    let (d, c) = (doubled.clone(), counter.clone());
    let tripled = runtime.derive(Purity::Pure, move || d.get() + read_untracked(&c));

    let steps: [(&str, i64); 5] = [("inc", 1), ("inc", 1), ("dec", -1), ("dec", -1), ("inc", 1)];
    for (label, delta) in steps {
        runtime.turn(|| counter.update(|v| v + delta))??;
        info!(
            step = label,
            counter = counter.get(),
            doubled = doubled.get(),
            tripled = tripled.get(),
            "turn finished"
        );
    }

    info!(
        executions = doubled.execution_count() + tripled.execution_count(),
        cache_hits = doubled.cache_hits() + tripled.cache_hits(),
        stats = ?runtime.stats(),
        "done"
    );
    Ok(())
}
