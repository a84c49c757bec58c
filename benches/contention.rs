use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use courtbook::engine::{Engine, EngineError};
use courtbook::model::*;

const HOUR: i64 = 3_600_000; // 1 hour in ms
const T0: Ms = 1_767_261_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn bench_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("courtbook_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Fresh engine with `courts` courts and `renters` renters (+4200000000, +4200000001, ...).
async fn setup(name: &str, courts: usize, renters: usize) -> (Arc<Engine>, Vec<Id>, Vec<String>) {
    let engine = Arc::new(Engine::new(bench_wal_path(name)).unwrap());
    let surface = engine
        .create_surface(SurfaceType {
            id: UNSET_ID,
            name: "clay".into(),
            cost_per_minute: Decimal::new(350, 2),
            created_at: 0,
            deleted_at: None,
        })
        .await
        .unwrap();

    let mut court_ids = Vec::with_capacity(courts);
    for i in 0..courts {
        let court = engine
            .create_court(Court {
                id: UNSET_ID,
                description: Some(format!("Court {i}")),
                surface_id: surface.id,
                created_at: 0,
                deleted_at: None,
            })
            .await
            .unwrap();
        court_ids.push(court.id);
    }

    let mut phones = Vec::with_capacity(renters);
    for i in 0..renters {
        let phone = format!("+420{i:010}");
        engine
            .create_user(User {
                id: UNSET_ID,
                phone_number: phone.clone(),
                name: format!("renter {i}"),
                password_hash: String::new(),
                roles: BTreeSet::from([Role::User]),
                created_at: 0,
                deleted_at: None,
            })
            .await
            .unwrap();
        phones.push(phone);
    }
    (engine, court_ids, phones)
}

/// N renters race for overlapping slots on one court; exactly one may win.
async fn phase1_same_slot_race() {
    let rounds = 50;
    let contenders = 32;
    let (engine, courts, phones) = setup("race.wal", 1, contenders).await;
    let court = courts[0];
    let phones = Arc::new(phones);

    let mut latencies = Vec::with_capacity(rounds * contenders);
    let start = Instant::now();
    for round in 0..rounds {
        let slot = T0 + (round as i64) * 4 * HOUR;
        let mut handles = Vec::with_capacity(contenders);
        for c in 0..contenders {
            let eng = engine.clone();
            let phones = phones.clone();
            handles.push(tokio::spawn(async move {
                // staggered by a minute each, all overlapping the first
                let s = slot + (c as i64) * 60_000;
                let t = Instant::now();
                let result = eng
                    .create_booking(BookingDraft::new(s, s + HOUR, false), court, &phones[c])
                    .await;
                (result, t.elapsed())
            }));
        }

        let mut winners = 0;
        for h in handles {
            let (result, elapsed) = h.await.unwrap();
            latencies.push(elapsed);
            match result {
                Ok(_) => winners += 1,
                Err(EngineError::InvalidRequest(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1, "round {round}: {winners} overlapping bookings admitted");
    }

    let elapsed = start.elapsed();
    println!(
        "  {rounds} rounds x {contenders} contenders in {:.2}s, one winner per round",
        elapsed.as_secs_f64()
    );
    assert_eq!(engine.bookings_by_court(court).await.len(), rounds);
    print_latency("create latency (contended)", &mut latencies);
}

/// Disjoint slots spread over many courts; measures group-commit throughput.
async fn phase2_disjoint_throughput() {
    let n_courts = 10;
    let per_court = 200;
    let (engine, courts, phones) = setup("throughput.wal", n_courts, 1).await;
    let phone = Arc::new(phones[0].clone());

    let start = Instant::now();
    let mut handles = Vec::with_capacity(n_courts);
    for court in courts {
        let eng = engine.clone();
        let phone = phone.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(per_court);
            for i in 0..per_court {
                let s = T0 + (i as i64) * HOUR;
                let t = Instant::now();
                eng.create_booking(BookingDraft::new(s, s + HOUR, false), court, &phone)
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    let n = n_courts * per_court;
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency (disjoint)", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== courtbook contention benchmark ===");

    println!("\n[phase 1] overlapping creates on one court");
    phase1_same_slot_race().await;

    println!("\n[phase 2] disjoint creates across courts");
    phase2_disjoint_throughput().await;

    println!("\n=== benchmark complete ===");
}
