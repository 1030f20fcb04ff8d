use super::*;
use crate::job::JobHandle;
use crate::test_utils::*;
use anyhow::Result;
use parking_lot::Mutex;
use rstest::rstest;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn test_thread_pool_names_and_lanes() -> Result<()> {
    let rt = init_runtime(2)?;

    assert_eq!(rt.worker_threads(), 2);
    assert_eq!(rt.lane_count(), 3);
    assert_eq!(rt.main_lane().index(), 2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handles = (0..16)
        .map(|_| {
            let seen = Arc::clone(&seen);
            rt.schedule(&JobHandle::completed(), move |ctx| {
                let name = std::thread::current().name().map(str::to_owned);
                seen.lock().push((ctx.lane().index(), name));
            })
        })
        .collect::<Vec<_>>();

    JobHandle::combine(&handles).complete();

    for (lane, name) in seen.lock().iter() {
        assert!(*lane < 2, "workers never run on the main lane");

        let name = name.as_deref().unwrap_or_default();
        let parts = name.split('-').collect::<Vec<_>>();
        assert_eq!(parts[0], "laneflow");
        assert!(parts[1].parse::<usize>().is_ok());
    }

    Ok(())
}

#[test]
fn test_custom_thread_name() -> Result<()> {
    let rt = Builder::new()
        .worker_threads(1)
        .thread_name("sim-worker")
        .try_build()?;

    let name = Arc::new(Mutex::new(None));
    {
        let name = Arc::clone(&name);
        rt.schedule(&JobHandle::completed(), move |_| {
            *name.lock() = std::thread::current().name().map(str::to_owned);
        })
        .complete();
    }

    assert_eq!(name.lock().as_deref(), Some("sim-worker"));
    Ok(())
}

#[test]
fn test_lane_matches_executing_worker() -> Result<()> {
    let rt = init_runtime(4)?;
    let pairs = Arc::new(Mutex::new(Vec::new()));

    let handles = (0..128)
        .map(|_| {
            let pairs = Arc::clone(&pairs);
            rt.schedule(&JobHandle::completed(), move |ctx| {
                pairs
                    .lock()
                    .push((ctx.lane().index(), std::thread::current().id()));
            })
        })
        .collect::<Vec<_>>();

    JobHandle::combine(&handles).complete();

    // One lane per thread and one thread per lane.
    let pairs = pairs.lock();
    let lanes = pairs.iter().map(|(l, _)| *l).collect::<HashSet<_>>();
    let distinct = pairs.iter().copied().collect::<HashSet<_>>();
    assert_eq!(lanes.len(), distinct.len());
    Ok(())
}

#[rstest]
#[case::workers_2(2)]
#[case::workers_4(4)]
fn test_work_is_spread_across_workers(#[case] workers: usize) -> Result<()> {
    let rt = init_runtime(workers)?;
    let lanes = Arc::new(Mutex::new(HashSet::new()));

    let handles = (0..64)
        .map(|_| {
            let lanes = Arc::clone(&lanes);
            rt.schedule(&JobHandle::completed(), move |ctx| {
                std::thread::sleep(Duration::from_millis(2));
                lanes.lock().insert(ctx.lane().index());
            })
        })
        .collect::<Vec<_>>();

    JobHandle::combine(&handles).complete();
    assert!(lanes.lock().len() > 1);
    Ok(())
}

#[test]
fn test_dependent_chain_runs_in_order() -> Result<()> {
    let rt = init_runtime(4)?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tail = JobHandle::completed();
    for i in 0..32 {
        let order = Arc::clone(&order);
        tail = rt.schedule(&tail, move |_| order.lock().push(i));
    }

    tail.complete();
    assert_eq!(*order.lock(), (0..32).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_panicking_job_does_not_kill_worker() -> Result<()> {
    let rt = init_runtime(1)?;

    let boom = rt.schedule(&JobHandle::completed(), |_| panic!("boom"));
    let skipped = rt.schedule(&boom, |_| unreachable!("dependent of a poisoned job"));

    let ran = Arc::new(AtomicUsize::new(0));
    let independent = {
        let ran = Arc::clone(&ran);
        rt.schedule(&JobHandle::completed(), move |_| {
            ran.fetch_add(1, Ordering::Relaxed);
        })
    };

    independent.complete();
    assert_eq!(ran.load(Ordering::Relaxed), 1);

    while !skipped.is_completed() {
        std::thread::yield_now();
    }
    assert!(boom.is_poisoned());
    assert!(skipped.is_poisoned());
    Ok(())
}

#[test]
fn test_shutdown_poisons_jobs_that_never_ran() -> Result<()> {
    let rt = init_runtime(2)?;
    let (dep, trigger) = pending();

    let stranded = rt.schedule(&dep, |_| unreachable!("runtime is gone"));
    rt.shutdown();

    trigger.fire();
    assert!(stranded.is_completed());
    assert!(stranded.is_poisoned());
    Ok(())
}

#[test]
fn test_main_lane_rejects_other_threads() -> Result<()> {
    let rt = Arc::new(init_runtime(1)?);

    let res = {
        let rt = Arc::clone(&rt);
        std::thread::spawn(move || rt.main_lane().index()).join()
    };

    assert!(res.is_err());
    assert_eq!(rt.main_lane().index(), 1);
    Ok(())
}

#[test]
fn test_ids_are_scoped_to_runtime() -> Result<()> {
    let a = init_runtime(1)?;
    let b = init_runtime(1)?;

    assert_eq!(a.ids().next_id(), 1);
    assert_eq!(a.ids().next_id(), 2);
    assert_eq!(b.ids().next_id(), 1);
    assert_ne!(a.lanes(), b.lanes());
    Ok(())
}
