use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use walkslot::config::EngineConfig;
use walkslot::engine::{Engine, ReserveOutcome};
use walkslot::holidays::ComputedGermanHolidays;
use walkslot::model::{Category, TimeOfDay};
use walkslot::store::{DurableStore, InMemoryStore, Store};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn hm(h: u16, m: u16) -> TimeOfDay {
    TimeOfDay::hm(h, m).expect("valid time")
}

async fn setup<S: Store>(store: Arc<S>) -> Arc<Engine<S>> {
    let config = EngineConfig {
        granularity_minutes: 15,
        ..EngineConfig::default()
    };
    let engine = Engine::new(store, Arc::new(ComputedGermanHolidays), config).expect("engine");
    engine
        .create_rule(Category::Weekday, "Day", hm(7, 0), hm(20, 0), false)
        .await
        .expect("rule");
    engine
        .create_rule(Category::Weekday, "Lunch", hm(12, 0), hm(13, 0), true)
        .await
        .expect("rule");
    engine
        .create_rule(Category::Weekend, "Weekend", hm(9, 0), hm(17, 0), false)
        .await
        .expect("rule");
    Arc::new(engine)
}

/// Every task books every slot of the same dates; each slot must be won once.
async fn phase_race<S: Store>(engine: Arc<Engine<S>>, n_tasks: usize, days: i64) {
    let resource = Ulid::new();
    let first = NaiveDate::from_ymd_opt(2025, 3, 3).expect("date");
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let (mut created, mut conflicts) = (0usize, 0usize);
            for d in 0..days {
                let date = first + chrono::Duration::days(d);
                for slot in engine.slots_for(date).await.expect("slots") {
                    let t = Instant::now();
                    match engine.reserve(resource, date, slot).await.expect("reserve") {
                        ReserveOutcome::Created(_) => created += 1,
                        ReserveOutcome::Conflict { .. } => conflicts += 1,
                        ReserveOutcome::Rejected(r) => panic!("generated slot rejected: {r}"),
                    }
                    latencies.push(t.elapsed());
                }
            }
            (latencies, created, conflicts)
        }));
    }

    let mut all = Vec::new();
    let (mut created, mut conflicts) = (0, 0);
    for h in handles {
        let (latencies, c, x) = h.await.expect("task");
        all.extend(latencies);
        created += c;
        conflicts += x;
    }
    let elapsed = start.elapsed();
    let ops = all.len() as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {days} days: {created} created, {conflicts} conflicts in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("reserve latency", &mut all);
}

async fn phase_reads<S: Store>(engine: Arc<Engine<S>>, n_readers: usize, reads: usize) {
    let date = NaiveDate::from_ymd_opt(2025, 3, 3).expect("date");
    let mut handles = Vec::new();
    for _ in 0..n_readers {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let resource = Ulid::new();
            let mut latencies = Vec::with_capacity(reads);
            for _ in 0..reads {
                let t = Instant::now();
                engine.available_slots(resource, date).await.expect("slots");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }
    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("task"));
    }
    print_latency("available_slots latency", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== walkslot stress benchmark ===\n");

    println!("[phase 1] reservation race, in-memory store");
    let engine = setup(Arc::new(InMemoryStore::new())).await;
    phase_race(Arc::clone(&engine), 16, 20).await;

    println!("\n[phase 2] slot reads");
    phase_reads(engine, 8, 2000).await;

    println!("\n[phase 3] reservation race, durable store");
    let dir: PathBuf = std::env::temp_dir().join("walkslot_bench");
    std::fs::create_dir_all(&dir).expect("bench dir");
    let path = dir.join(format!("{}.wal", Ulid::new()));
    let store = Arc::new(DurableStore::open(&path).expect("open store"));
    let engine = setup(store).await;
    phase_race(engine, 16, 5).await;
    let _ = std::fs::remove_file(&path);

    println!("\n=== done ===");
}
