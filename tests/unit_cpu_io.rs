#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use loadgen_agent::accounting::{duration_ms, thread_cpu_time, CpuAccountant};
use loadgen_agent::lib_cpu::{CpuBurner, WorkVariant};
use loadgen_agent::lib_io::wait;
use loadgen_agent::LoadError;

fn burner() -> CpuBurner {
    CpuBurner::from_entropy(16 * 1024, CpuAccountant::thread_cpu(), 0.99).expect("burner")
}

#[test]
fn accountant_is_monotonic() {
    let acct = CpuAccountant::thread_cpu();
    let mark = acct.mark().expect("mark");
    let first = acct.since(&mark).expect("since");
    let b = burner();
    for _ in 0..50 {
        b.work_unit(WorkVariant::Light);
    }
    let second = acct.since(&mark).expect("since");
    assert!(first >= 0.0);
    assert!(second >= first);
}

#[test]
fn burn_zero_does_nothing() {
    let r = burner().burn(0, WorkVariant::Light).expect("burn");
    assert_eq!(r.iterations, 0);
    assert!(r.elapsed_cpu_ms < 0.5);
}

#[test]
fn burn_meets_budget_with_bounded_overshoot() {
    let b = burner();
    let unit = b.calibrate(WorkVariant::Light, 200).expect("calibrate").max(0.2);
    for target in [5u64, 50] {
        let r = b.burn(target, WorkVariant::Light).expect("burn");
        let floor = target as f64 * 0.99;
        assert!(r.iterations > 0);
        assert!(r.elapsed_cpu_ms >= floor, "{} < {floor}", r.elapsed_cpu_ms);
        assert!(
            r.elapsed_cpu_ms - floor < 5.0 * unit,
            "overshoot {} with unit {unit}",
            r.elapsed_cpu_ms - floor
        );
    }
}

#[test]
fn heavy_variant_burns() {
    let r = burner().burn(20, WorkVariant::Heavy).expect("burn");
    assert!(r.iterations > 0);
    assert!(r.elapsed_cpu_ms >= 19.8);
}

#[test]
fn budget_below_one_unit_runs_exactly_one() {
    // A 4 MiB digest takes well over a millisecond.
    let b = CpuBurner::with_buffer(vec![7u8; 4 * 1024 * 1024], CpuAccountant::thread_cpu(), 0.99);
    let r = b.burn(1, WorkVariant::Light).expect("burn");
    assert_eq!(r.iterations, 1);
    assert!(r.elapsed_cpu_ms >= 0.99);
}

#[test]
fn cancelled_burn_stops_before_work() {
    let cancel = AtomicBool::new(true);
    let res = burner().burn_cancellable(1000, WorkVariant::Light, &cancel);
    assert!(matches!(res, Err(LoadError::Cancelled { iterations: 0 })));
}

#[test]
fn variant_parse() {
    assert_eq!("HEAVY".parse::<WorkVariant>().expect("heavy"), WorkVariant::Heavy);
    assert_eq!("light".parse::<WorkVariant>().expect("light"), WorkVariant::Light);
    assert!("medium".parse::<WorkVariant>().is_err());
}

#[tokio::test]
async fn wait_sleeps_without_cpu() {
    let cpu_before = thread_cpu_time().expect("cpu");
    let started = Instant::now();
    wait(100).await;
    let wall = duration_ms(started.elapsed());
    let cpu = duration_ms(thread_cpu_time().expect("cpu").saturating_sub(cpu_before));
    assert!(wall >= 100.0, "woke after {wall}ms");
    assert!(cpu < 20.0, "wait consumed {cpu}ms of cpu");
}

#[tokio::test]
async fn wait_zero_returns_immediately() {
    let started = Instant::now();
    wait(0).await;
    assert!(started.elapsed().as_millis() < 50);
}
