use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use slotbook::engine::{BookingEngine, EngineError};
use slotbook::model::{Schedule, SlotKey};
use slotbook::store::Storage;

const TIMES: [&str; 6] = ["08:00", "09:00", "10:00", "17:00", "18:00", "19:00"];

async fn open_engine(label: &str) -> (Storage, Arc<BookingEngine>) {
    let dir = std::env::temp_dir().join(format!("slotbook_bench_{label}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let storage = Storage::open(&dir.join("slotbook.wal")).unwrap();
    let engine = Arc::new(BookingEngine::new(&storage, Schedule::default()));
    (storage, engine)
}

fn date(offset: u64) -> String {
    let base = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    (base + Days::new(offset)).format("%Y-%m-%d").to_string()
}

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
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential() {
    let (storage, engine) = open_engine("sequential").await;
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    // 8 seats x 6 times per day, so spread over enough days to never fill up.
    for i in 0..n {
        let day = date((i / 48) as u64);
        let time = TIMES[i % TIMES.len()];
        let t = Instant::now();
        engine
            .create_reservation(&format!("member-{i}"), &day, time)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
    storage.close().await.unwrap();
}

async fn phase2_contention() {
    let (storage, engine) = open_engine("contention").await;
    let capacity = 5;
    let days = 20;
    let per_slot = 50;

    for d in 0..days {
        let times: Vec<String> = TIMES.iter().map(|t| t.to_string()).collect();
        engine.seed_slots(&date(d), &times, capacity).await.unwrap();
    }

    let admitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for d in 0..days {
        for time in TIMES {
            for i in 0..per_slot {
                let engine = engine.clone();
                let admitted = admitted.clone();
                let rejected = rejected.clone();
                let day = date(d);
                handles.push(tokio::spawn(async move {
                    match engine.create_reservation(&format!("m{i}"), &day, time).await {
                        Ok(_) => admitted.fetch_add(1, Ordering::Relaxed),
                        Err(EngineError::CapacityExceeded { .. }) => {
                            rejected.fetch_add(1, Ordering::Relaxed)
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                }));
            }
        }
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = days as usize * TIMES.len() * per_slot;
    let ok = admitted.load(Ordering::Relaxed);
    println!(
        "  {total} attempts on {} slots of {capacity} in {:.2}s: {ok} admitted, {} rejected",
        days as usize * TIMES.len(),
        elapsed.as_secs_f64(),
        rejected.load(Ordering::Relaxed)
    );

    for d in 0..days {
        for slot in engine.slots().list_by_date(&date(d)).await {
            assert_eq!(slot.booked_count, capacity, "slot {} not exactly full", slot.key);
        }
    }
    assert_eq!(ok, days as usize * TIMES.len() * capacity as usize);
    println!("  no slot overbooked");
    storage.close().await.unwrap();
}

async fn phase3_read_under_load() {
    let (storage, engine) = open_engine("read_load").await;
    let schedule = Schedule::default();

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5u64 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let day = date(w * 1000 + (i / 48) as u64);
                let time = TIMES[i % TIMES.len()];
                let _ = engine.create_reservation("writer", &day, time).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        let schedule = schedule.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let day = date(10_000 + (r * reads_per_reader + i) as u64 % 30);
                let t = Instant::now();
                engine.list_slots_for_date(&day, &schedule).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("slot listing", &mut all_latencies);
    storage.close().await.unwrap();
}

async fn phase4_churn() {
    let (storage, engine) = open_engine("churn").await;
    let day = date(0);
    let key = SlotKey::parse(&day, "18:00").unwrap();
    let n_tasks = 20;
    let rounds = 100;

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        let day = day.clone();
        handles.push(tokio::spawn(async move {
            let mut cycles = 0;
            for _ in 0..rounds {
                let Ok(booked) = engine.create_reservation(&format!("c{t}"), &day, "18:00").await
                else {
                    tokio::task::yield_now().await;
                    continue;
                };
                engine.delete_reservation(booked.reservation.id).await.unwrap();
                cycles += 1;
            }
            cycles
        }));
    }

    let mut cycles = 0;
    for h in handles {
        cycles += h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let slot = engine.slots().get(&key).await.unwrap();
    println!(
        "  {cycles} book/cancel cycles in {:.2}s, final booked_count={}",
        elapsed.as_secs_f64(),
        slot.booked_count
    );
    assert_eq!(slot.booked_count, 0);
    assert_eq!(engine.reservations_at(&key).await, 0);

    let t = Instant::now();
    storage.compact().await.unwrap();
    println!("  compaction after churn took {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);
    storage.close().await.unwrap();
}

#[tokio::main]
async fn main() {
    println!("=== slotbook stress benchmark ===\n");

    println!("[phase 1] sequential write throughput");
    phase1_sequential().await;

    println!("\n[phase 2] contention on full slots");
    phase2_contention().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] book/cancel churn");
    phase4_churn().await;

    println!("\n=== benchmark complete ===");
}
