//! 后台任务与派发器集成测试。

use offload::core::dispatcher::{call_in_background, DispatchStrategy};
use offload::core::partition::triangular_range_partition;
use offload::core::task::{in_forked_child, spawn, spawn_process, TaskHandle};
use offload::models::plan::RowRange;
use offload::BackgroundTaskError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn chunks_fan_out_and_join_in_order() {
    let ranges = triangular_range_partition(0, 90, 300.0).unwrap();
    let handles: Vec<TaskHandle<u64>> = ranges
        .iter()
        .map(|&range| spawn(move || Ok(range.tril_cost())))
        .collect::<Result<_, _>>()
        .unwrap();

    let total: u64 = handles
        .into_iter()
        .map(|h| h.into_result().unwrap())
        .sum();
    assert_eq!(total, RowRange::new(0, 90).tril_cost());
}

#[test]
fn pipelined_writer_keeps_submission_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);

    call_in_background(DispatchStrategy::Concurrent, |scope| {
        let write = scope.wrap("write", move |block: usize| {
            // 越早提交的块睡得越久，若并发执行则顺序会被打乱
            thread::sleep(Duration::from_millis(30 - 5 * block as u64));
            sink.lock().unwrap().push(block);
            Ok(())
        });
        for block in 0..5 {
            write.call(block).unwrap();
        }
    });

    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn process_returns_nested_value() {
    let mut expected = BTreeMap::new();
    expected.insert("occupied".to_string(), vec![(0_usize, 24_usize), (24, 34)]);
    expected.insert("virtual".to_string(), vec![]);
    let value = expected.clone();

    let handle = unsafe { spawn_process(move || Ok(value)) }.unwrap();
    assert_eq!(handle.into_result().unwrap(), expected);
}

#[test]
fn process_failure_keeps_message() {
    let mut handle = unsafe {
        spawn_process(|| -> anyhow::Result<f64> {
            Err(anyhow::anyhow!("max cycle reached").context("scf did not converge"))
        })
    }
    .unwrap();

    let err = handle.join().unwrap_err();
    assert!(matches!(err, BackgroundTaskError::Failed { .. }));
    assert_eq!(err.message(), "scf did not converge: max cycle reached");
    assert_eq!(err.cause().unwrap().root_cause().to_string(), "max cycle reached");
}

#[test]
fn process_panic_is_reported() {
    let handle = unsafe { spawn_process(|| -> anyhow::Result<u8> { panic!("bad basis") }) }.unwrap();
    match handle.into_result() {
        Err(BackgroundTaskError::Panicked { message, .. }) => assert_eq!(message, "bad basis"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn process_abnormal_exit_is_reported() {
    let handle = unsafe {
        spawn_process(|| -> anyhow::Result<u8> {
            libc::_exit(3)
        })
    }
    .unwrap();
    match handle.into_result() {
        Err(BackgroundTaskError::ProcessExited { status, .. }) => assert_eq!(status, "exit code 3"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn forked_child_dispatches_synchronously() {
    let handle = unsafe {
        spawn_process(|| Ok((in_forked_child(), DispatchStrategy::current().is_degraded())))
    }
    .unwrap();

    assert_eq!(handle.into_result().unwrap(), (true, true));
    assert!(!in_forked_child());
}

#[test]
fn quick_process_join_is_not_held_by_sibling_forks() {
    let stop = Arc::new(AtomicBool::new(false));
    let spawner_stop = Arc::clone(&stop);

    // 持续 fork 慢任务；快任务的结果写端不能泄漏到这些子进程中
    let spawner = thread::spawn(move || {
        let mut slow = Vec::new();
        while !spawner_stop.load(Ordering::Relaxed) {
            let handle = unsafe {
                spawn_process(|| {
                    thread::sleep(Duration::from_millis(400));
                    Ok(0_u8)
                })
            }
            .unwrap();
            slow.push(handle);
            thread::sleep(Duration::from_millis(10));
        }
        for handle in slow {
            handle.into_result().unwrap();
        }
    });

    let mut worst = Duration::ZERO;
    for _ in 0..100 {
        let handle = unsafe { spawn_process(|| Ok(1_u8)) }.unwrap();
        let started = Instant::now();
        assert_eq!(handle.into_result().unwrap(), 1);
        worst = worst.max(started.elapsed());
    }

    stop.store(true, Ordering::Relaxed);
    spawner.join().unwrap();
    assert!(worst < Duration::from_millis(300), "quick join took {:?}", worst);
}
