use super::*;
use crate::errors::ConfigError;
use crate::runtime::Runtime;
use crate::stream::{DataStream, StreamOpts};
use crate::test_utils::*;
use anyhow::Result;
use static_assertions::assert_impl_all;
use std::any::type_name;

assert_impl_all!(TaskDriver: Send, Sync, Clone);
assert_impl_all!(TaskSystem: Send, Sync);

/// Driver with one cancellable stream whose records live until cancelled.
fn persistent_driver(system: &TaskSystem) -> Result<(TaskDriver, DataStream<u32>)> {
    let mut builder = system.driver("persistent");
    let stream = builder.stream::<u32>(StreamOpts::CANCELLABLE)?;
    builder
        .update(&stream)
        .on_update(|cx, payload| cx.continue_with(*payload))
        .on_cancel(|cx, payload| match *payload {
            0 => cx.complete(),
            n => cx.continue_cancelling(n - 1),
        })
        .add()?;

    Ok((builder.build()?, stream))
}

fn write(rt: &Runtime, stream: &DataStream<u32>, records: &[(u32, u32)]) {
    let entries = records
        .iter()
        .map(|&(i, payload)| stream.new_entry(entity(i), payload))
        .collect::<Vec<_>>();
    stream.write_now(&rt.main_lane(), entries);
}

fn completed(driver: &TaskDriver) -> Vec<u32> {
    let mut indices = driver
        .cancel_completions()
        .into_iter()
        .map(|id| id.entity.index)
        .collect::<Vec<_>>();
    indices.sort_unstable();
    indices
}

#[test]
fn test_cancel_one_of_three() -> Result<()> {
    let rt = init_runtime(2)?;
    let mut system = TaskSystem::new(&rt);
    let (driver, stream) = persistent_driver(&system)?;
    let driver = system.add(driver);

    write(&rt, &stream, &[(1, 0), (2, 0), (3, 0)]);
    system.update(&rt);
    assert_eq!(entities(&stream.live_snapshot()), vec![1, 2, 3]);
    assert!(driver.cancel_completions().is_empty());

    driver.request_cancel(&rt.main_lane(), entity(2));
    system.update(&rt);
    assert_eq!(completed(&driver), vec![2]);
    assert_eq!(driver.pending_cancellations(), 0);

    system.update(&rt);
    assert_eq!(entities(&stream.live_snapshot()), vec![1, 3]);
    assert!(driver.cancel_completions().is_empty());
    Ok(())
}

#[test]
fn test_cancel_requested_twice_completes_once() -> Result<()> {
    let rt = init_runtime(3)?;
    let mut system = TaskSystem::new(&rt);
    let (driver, stream) = persistent_driver(&system)?;
    let driver = system.add(driver);

    write(&rt, &stream, &[(1, 0), (2, 0)]);
    system.update(&rt);

    driver.request_cancel(&rt.main_lane(), entity(1));
    driver.request_cancel(&rt.main_lane(), entity(1));
    system.update(&rt);

    assert_eq!(completed(&driver), vec![1]);
    assert_eq!(driver.completion_stream().live_len(), 1);
    Ok(())
}

#[test]
fn test_cancellation_kept_in_flight() -> Result<()> {
    let rt = init_runtime(2)?;
    let mut system = TaskSystem::new(&rt);
    let (driver, stream) = persistent_driver(&system)?;
    let driver = system.add(driver);

    // Takes two extra cycles to drain.
    write(&rt, &stream, &[(1, 2), (2, 0)]);
    system.update(&rt);
    driver.request_cancel(&rt.main_lane(), entity(1));

    system.update(&rt);
    assert!(driver.cancel_completions().is_empty());
    assert_eq!(driver.pending_cancellations(), 1);

    system.update(&rt);
    assert!(driver.cancel_completions().is_empty());
    assert_eq!(driver.pending_cancellations(), 1);

    system.update(&rt);
    assert_eq!(completed(&driver), vec![1]);
    assert_eq!(driver.pending_cancellations(), 0);
    assert_eq!(entities(&stream.live_snapshot()), vec![2]);
    Ok(())
}

#[test]
fn test_cancelling_unknown_entity_is_noop() -> Result<()> {
    let rt = init_runtime(1)?;
    let mut system = TaskSystem::new(&rt);
    let (driver, stream) = persistent_driver(&system)?;
    let driver = system.add(driver);

    write(&rt, &stream, &[(1, 0)]);
    driver.request_cancel(&rt.main_lane(), entity(99));
    system.update(&rt);

    assert!(driver.cancel_completions().is_empty());
    assert_eq!(driver.pending_cancellations(), 0);
    assert_eq!(entities(&stream.live_snapshot()), vec![1]);
    Ok(())
}

#[test]
fn test_resolved_records_reach_other_driver() -> Result<()> {
    let rt = init_runtime(2)?;
    let mut system = TaskSystem::new(&rt);

    let mut producer = system.driver("producer");
    let mut consumer = system.driver("consumer");
    let inputs = producer.stream::<u32>(StreamOpts::empty())?;
    let outputs = consumer.stream::<String>(StreamOpts::empty())?;

    let target = consumer.context();
    producer
        .update(&inputs)
        .resolves::<String>(target)?
        .on_update(move |cx, payload| {
            let resolved = cx.resolve_to(target, format!("done {payload}"));
            assert!(resolved.is_some());
        })
        .add()?;

    let producer = system.add(producer.build()?);
    system.add(consumer.build()?);

    write(&rt, &inputs, &[(1, 10), (2, 20)]);
    system.update(&rt);

    // Producer runs first, the consumer consolidated its records already.
    let live = outputs.live_snapshot();
    assert_eq!(entities(&live), vec![1, 2]);
    assert_eq!(live[0].payload, "done 10");
    assert!(live.iter().all(|e| e.id.context == target));
    assert!(live.iter().all(|e| e.id.active_id == outputs.active_id()));

    // Not continued, so dropped from the producer.
    system.update(&rt);
    assert_eq!(inputs.live_len(), 0);
    assert_eq!(outputs.live_len(), 0);
    assert_ne!(producer.context(), target);
    Ok(())
}

#[test]
fn test_cancel_resolving_into_own_cancellable_stream_stays_in_flight() -> Result<()> {
    let rt = init_runtime(2)?;
    let mut system = TaskSystem::new(&rt);

    let mut builder = system.driver("handoff");
    let context = builder.context();
    let first = builder.stream::<u32>(StreamOpts::CANCELLABLE)?;
    let second = builder.stream::<u64>(StreamOpts::CANCELLABLE)?;

    builder
        .update(&first)
        .resolves::<u64>(context)?
        .on_update(|cx, payload| cx.continue_with(*payload))
        .on_cancel(|cx, payload| {
            cx.resolve(u64::from(*payload));
        })
        .add()?;
    builder
        .update(&second)
        .on_update(|cx, payload| cx.continue_with(*payload))
        .add()?;
    let driver = system.add(builder.build()?);

    write(&rt, &first, &[(1, 7)]);
    system.update(&rt);
    driver.request_cancel(&rt.main_lane(), entity(1));

    // Handed over to the second stream, still cancelling.
    system.update(&rt);
    assert!(driver.cancel_completions().is_empty());
    assert_eq!(driver.pending_cancellations(), 1);

    // The second stream's update job completes it.
    system.update(&rt);
    assert_eq!(completed(&driver), vec![1]);
    let handed_over = second.live_snapshot();
    assert_eq!(entities(&handed_over), vec![1]);
    assert_eq!(handed_over[0].payload, 7);

    system.update(&rt);
    assert_eq!(second.live_len(), 0);
    assert_eq!(first.live_len(), 0);
    Ok(())
}

#[test]
fn test_configuration_errors() -> Result<()> {
    let rt = init_runtime(1)?;
    let system = TaskSystem::new(&rt);
    let mut a = system.driver("a");
    let mut b = system.driver("b");

    let ints = a.stream::<u32>(StreamOpts::empty())?;
    let foreign = b.stream::<u32>(StreamOpts::empty())?;

    assert_eq!(
        a.stream::<u32>(StreamOpts::CANCELLABLE).err(),
        Some(ConfigError::DuplicateResolveTarget {
            type_name: type_name::<u32>(),
            context: a.context(),
        })
    );
    assert_eq!(
        a.update(&foreign).add(),
        Err(ConfigError::ForeignStream {
            owner: b.context(),
            driver: a.context(),
        })
    );
    assert_eq!(
        a.update(&ints).on_cancel(|cx, _| cx.complete()).add(),
        Err(ConfigError::NotCancellable {
            type_name: type_name::<u32>(),
        })
    );
    assert_eq!(
        a.update(&ints).resolves::<String>(b.context()).err(),
        Some(ConfigError::UnknownResolveTarget {
            type_name: type_name::<String>(),
            context: b.context(),
        })
    );

    a.update(&ints).add()?;
    assert_eq!(
        a.update(&ints).add(),
        Err(ConfigError::DuplicateUpdateJob {
            type_name: type_name::<u32>(),
            driver: a.context(),
        })
    );
    Ok(())
}

#[test]
fn test_cancellable_stream_without_update_job_is_rejected() -> Result<()> {
    let rt = init_runtime(1)?;
    let system = TaskSystem::new(&rt);

    let mut builder = system.driver("handoff");
    let context = builder.context();
    let first = builder.stream::<u32>(StreamOpts::CANCELLABLE)?;
    builder.stream::<u64>(StreamOpts::CANCELLABLE)?;

    // Cancellations resolved into the `u64` stream would stay in flight with
    // nothing left to complete them.
    builder
        .update(&first)
        .resolves::<u64>(context)?
        .on_update(|cx, payload| cx.continue_with(*payload))
        .on_cancel(|cx, payload| {
            cx.resolve(u64::from(*payload));
        })
        .add()?;

    assert_eq!(
        builder.build().err(),
        Some(ConfigError::MissingUpdateJob {
            type_name: type_name::<u64>(),
            driver: context,
        })
    );
    Ok(())
}

#[test]
fn test_plain_stream_without_update_job_builds() -> Result<()> {
    let rt = init_runtime(1)?;
    let system = TaskSystem::new(&rt);

    let mut builder = system.driver("sink");
    builder.stream::<u64>(StreamOpts::empty())?;
    assert!(builder.build().is_ok());
    Ok(())
}
