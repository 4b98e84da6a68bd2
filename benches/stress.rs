use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ulid::Ulid;

use courtbook::config::BookingSettings;
use courtbook::engine::{Engine, EngineError, HoldRequest, Ports};
use courtbook::hold::MemoryHoldStore;
use courtbook::model::TimeRange;
use courtbook::notify::NotifyHub;
use courtbook::payment;
use courtbook::store::{StaticCatalog, WalStore};

const COURTS: usize = 10;

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

/// One venue, `COURTS` courts open around the clock, flat pricing.
fn catalog(courts: &[Ulid]) -> StaticCatalog {
    let venue = Ulid::new();
    let weekdays = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let mut court_docs = Vec::new();
    let mut hours = Vec::new();
    let mut rules = Vec::new();
    for (i, id) in courts.iter().enumerate() {
        court_docs.push(format!(
            r#"{{"id":"{id}","venue_id":"{venue}","name":"Court {}","sport":"BADMINTON"}}"#,
            i + 1
        ));
        for day in weekdays {
            hours.push(format!(
                r#"{{"court_id":"{id}","weekday":"{day}","open":"00:00:00","close":"00:00:00"}}"#
            ));
        }
        for day_type in ["WEEKDAY", "WEEKEND"] {
            rules.push(format!(
                r#"{{"court_id":"{id}","day_type":"{day_type}","start":"00:00:00","end":"00:00:00","price_per_hour":120000,"peak":false}}"#
            ));
        }
    }
    let json = format!(
        r#"{{"venues":[{{"id":"{venue}","name":"Bench Arena"}}],"courts":[{}],"operating_hours":[{}],"pricing_rules":[{}]}}"#,
        court_docs.join(","),
        hours.join(","),
        rules.join(",")
    );
    StaticCatalog::from_json(&json).unwrap()
}

fn setup(name: &str) -> (Arc<Engine>, Vec<Ulid>) {
    let path = std::env::temp_dir().join("courtbook_bench").join(name);
    let _ = std::fs::remove_file(&path);
    let store = WalStore::open(&path).unwrap();
    let courts: Vec<Ulid> = (0..COURTS).map(|_| Ulid::new()).collect();
    let ports = Ports {
        bookings: Arc::new(store.clone()),
        catalog: Arc::new(catalog(&courts)),
        holds: Arc::new(MemoryHoldStore::new()),
        audit: Arc::new(store),
        payments: Arc::new(payment::Disabled),
        notifier: Arc::new(NotifyHub::new()),
    };
    (Arc::new(Engine::new(ports, BookingSettings::default())), courts)
}

fn base_date() -> NaiveDate {
    Utc::now().date_naive() + chrono::Duration::days(7)
}

/// The `n`th hour after local midnight of `base_date()`.
fn hour_slot(n: i64) -> TimeRange {
    let midnight: DateTime<Utc> = Utc.from_utc_datetime(&base_date().and_hms_opt(0, 0, 0).unwrap());
    let start = midnight + chrono::Duration::hours(n);
    TimeRange::new(start, start + chrono::Duration::hours(1)).unwrap()
}

async fn phase1_sequential(engine: &Engine, court_id: Ulid) {
    let n = 2000;
    let mut hold_lat = Vec::with_capacity(n);
    let mut confirm_lat = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let user_id = Ulid::new();
        let t = Instant::now();
        let created = engine
            .create_hold(HoldRequest { user_id, court_id, range: hour_slot(i as i64) })
            .await
            .unwrap();
        hold_lat.push(t.elapsed());

        let t = Instant::now();
        engine.confirm_hold(created.booking_id, user_id, None).await.unwrap();
        confirm_lat.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = (2 * n) as f64 / elapsed.as_secs_f64();
    println!("  {n} hold+confirm pairs in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create_hold", &mut hold_lat);
    print_latency("confirm_hold", &mut confirm_lat);
}

async fn phase2_contention(engine: Arc<Engine>, courts: &[Ulid]) {
    let slots_per_court = 48;
    let contenders = 8;

    let start = Instant::now();
    let mut handles = Vec::new();
    for &court_id in &courts[1..] {
        for s in 0..slots_per_court {
            for _ in 0..contenders {
                let engine = engine.clone();
                handles.push(tokio::spawn(async move {
                    let t = Instant::now();
                    let r = engine
                        .create_hold(HoldRequest { user_id: Ulid::new(), court_id, range: hour_slot(s) })
                        .await;
                    (r, t.elapsed())
                }));
            }
        }
    }

    let mut won = 0;
    let mut conflicts = 0;
    let mut latencies = Vec::with_capacity(handles.len());
    for h in handles {
        let (r, lat) = h.await.unwrap();
        latencies.push(lat);
        match r {
            Ok(_) => won += 1,
            Err(EngineError::SlotConflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let slots = (courts.len() - 1) as i64 * slots_per_court;
    let elapsed = start.elapsed();
    println!(
        "  {} attempts on {slots} slots in {:.2}s: {won} won, {conflicts} conflicts",
        latencies.len(),
        elapsed.as_secs_f64()
    );
    assert_eq!(won, slots, "every slot must have exactly one winner");
    print_latency("contended create_hold", &mut latencies);
}

async fn phase3_read_under_load(engine: Arc<Engine>, court_id: Ulid) {
    let writers = 4;
    let readers = 4;
    let reads_per_reader = 500;

    let mut writer_handles = Vec::new();
    for w in 0..writers {
        let engine = engine.clone();
        writer_handles.push(tokio::spawn(async move {
            // disjoint hours per writer, a week past the contention window
            for i in 0..250i64 {
                let slot = hour_slot(24 * 14 + i * writers + w);
                let _ = engine
                    .create_hold(HoldRequest { user_id: Ulid::new(), court_id, range: slot })
                    .await;
            }
        }));
    }

    let mut reader_handles = Vec::new();
    for r in 0..readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut lat = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let date = base_date() + chrono::Duration::days(14 + ((i + r) % 40) as i64);
                let t = Instant::now();
                engine.availability(court_id, date).await.unwrap();
                lat.push(t.elapsed());
            }
            lat
        }));
    }

    for h in writer_handles {
        h.await.unwrap();
    }
    let mut all = Vec::new();
    for h in reader_handles {
        all.extend(h.await.unwrap());
    }
    print_latency("availability under write load", &mut all);
}

#[tokio::main]
async fn main() {
    std::fs::create_dir_all(std::env::temp_dir().join("courtbook_bench")).unwrap();
    println!("=== courtbook stress benchmark ===\n");

    println!("[phase 1] sequential hold + confirm");
    let (engine, courts) = setup("phase1.wal");
    phase1_sequential(&engine, courts[0]).await;

    println!("\n[phase 2] contended holds");
    let (engine, courts) = setup("phase2.wal");
    phase2_contention(engine, &courts).await;

    println!("\n[phase 3] availability latency under write load");
    let (engine, courts) = setup("phase3.wal");
    phase3_read_under_load(engine, courts[0]).await;

    println!("\n=== benchmark complete ===");
}
