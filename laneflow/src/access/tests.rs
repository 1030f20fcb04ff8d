use super::*;
use crate::job::JobHandle;
use crate::test_utils::*;
use anyhow::Result;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

assert_impl_all!(AccessController: Send, Sync);
assert_impl_all!(AccessControlledValue<Vec<u32>>: Send, Sync, Clone);
assert_impl_all!(ValueAccess<Vec<u32>>: Send);

#[rstest]
#[case::read_read(AccessKind::SharedRead, AccessKind::SharedRead, true)]
#[case::read_write(AccessKind::SharedRead, AccessKind::SharedWrite, true)]
#[case::write_write(AccessKind::SharedWrite, AccessKind::SharedWrite, true)]
#[case::read_exclusive(AccessKind::SharedRead, AccessKind::ExclusiveWrite, false)]
#[case::exclusive_exclusive(AccessKind::ExclusiveWrite, AccessKind::ExclusiveWrite, false)]
#[case::write_disposal(AccessKind::SharedWrite, AccessKind::Disposal, false)]
fn test_kind_compatibility(#[case] a: AccessKind, #[case] b: AccessKind, #[case] expected: bool) {
    assert_eq!(a.is_compatible_with(b), expected);
    assert_eq!(b.is_compatible_with(a), expected);
}

#[test]
fn test_exclusive_waits_on_every_shared_release() {
    let controller = AccessController::new();
    let mut releases = Vec::new();
    let mut triggers = Vec::new();

    for kind in [
        AccessKind::SharedRead,
        AccessKind::SharedWrite,
        AccessKind::SharedRead,
    ] {
        let wait = controller.acquire_async(kind);
        assert!(wait.is_completed());

        let (release, trigger) = pending();
        controller.release_async(&release);
        releases.push(release);
        triggers.push(trigger);
    }

    let exclusive = controller.acquire_async(AccessKind::ExclusiveWrite);
    assert!(releases.iter().all(|r| exclusive.depends_on(r)));

    for trigger in triggers {
        assert!(!exclusive.is_completed());
        trigger.fire();
    }
    assert!(exclusive.is_completed());
}

#[test]
fn test_shared_waits_on_last_writer_only() {
    let controller = AccessController::new();

    controller.acquire_async(AccessKind::ExclusiveWrite);
    let (writer, writer_trigger) = pending();
    controller.release_async(&writer);

    let read = controller.acquire_async(AccessKind::SharedRead);
    let (reader, _reader_trigger) = pending();
    controller.release_async(&reader);

    // A second shared grant doesn't wait on the first one.
    let write = controller.acquire_async(AccessKind::SharedWrite);
    assert!(read.depends_on(&writer));
    assert!(write.depends_on(&writer));
    assert!(!write.depends_on(&reader));
    controller.release();

    writer_trigger.fire();
    assert!(read.is_completed());
    assert!(write.is_completed());
}

#[test]
fn test_exclusive_release_resets_frontiers() {
    let controller = AccessController::new();

    controller.acquire_async(AccessKind::SharedRead);
    let (old_reader, _old) = pending();
    controller.release_async(&old_reader);

    let exclusive = controller.acquire_async(AccessKind::ExclusiveWrite);
    assert!(exclusive.depends_on(&old_reader));

    let (writer, trigger) = pending();
    controller.release_async(&writer);

    let next = controller.acquire_async(AccessKind::ExclusiveWrite);
    assert_eq!(next.id(), writer.id());
    controller.release();

    trigger.fire();
}

#[test]
fn test_disposal_is_last() {
    let controller = AccessController::new();

    controller.acquire_async(AccessKind::SharedRead);
    let (reader, trigger) = pending();
    controller.release_async(&reader);

    let dispose = controller.acquire_async(AccessKind::Disposal);
    assert!(dispose.depends_on(&reader));
    assert!(controller.is_acquired());

    controller.release();
    assert!(controller.is_disposed());
    assert!(!controller.is_acquired());

    trigger.fire();
    assert!(dispose.is_completed());
}

#[test]
#[should_panic(expected = "outstanding")]
fn test_exclusive_while_shared_outstanding_panics() {
    let controller = AccessController::new();
    controller.acquire_async(AccessKind::SharedRead);
    controller.acquire_async(AccessKind::ExclusiveWrite);
}

#[test]
#[should_panic(expected = "outstanding")]
fn test_shared_while_exclusive_outstanding_panics() {
    let controller = AccessController::new();
    controller.acquire_async(AccessKind::ExclusiveWrite);
    controller.acquire_async(AccessKind::SharedRead);
}

#[test]
#[should_panic(expected = "release without an outstanding grant")]
fn test_release_without_grant_panics() {
    AccessController::new().release();
}

#[test]
#[should_panic(expected = "disposed")]
fn test_access_after_disposal_panics() {
    let controller = AccessController::new();
    controller.acquire(AccessKind::Disposal);
    controller.release();
    controller.acquire_async(AccessKind::SharedRead);
}

#[test]
fn test_scoped_guard_releases_on_drop() {
    let controller = AccessController::new();

    {
        let _guard = controller.acquire_scoped(AccessKind::ExclusiveWrite);
        assert!(controller.is_acquired());
    }

    assert!(!controller.is_acquired());
    let _again = controller.acquire_scoped(AccessKind::ExclusiveWrite);
}

#[test]
fn test_sync_acquire_waits_for_jobs() -> Result<()> {
    let rt = init_runtime(2)?;
    let controller = AccessController::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let wait = controller.acquire_async(AccessKind::SharedWrite);
        let counter = Arc::clone(&counter);
        let job = rt.schedule(&wait, move |_| {
            std::thread::sleep(std::time::Duration::from_millis(1));
            counter.fetch_add(1, Ordering::Relaxed);
        });
        controller.release_async(&job);
    }

    let _guard = controller.acquire_scoped(AccessKind::ExclusiveWrite);
    assert_eq!(counter.load(Ordering::Relaxed), 8);
    Ok(())
}

#[test]
fn test_value_jobs_are_ordered() -> Result<()> {
    let rt = init_runtime(4)?;
    let value = AccessControlledValue::new(Vec::new());
    let mut reads = Vec::new();

    for i in 0..16 {
        value.schedule_write(&rt, &JobHandle::completed(), move |_, v| v.push(i));

        let seen = Arc::new(AtomicUsize::new(0));
        let job = {
            let seen = Arc::clone(&seen);
            value.schedule_read(&rt, &JobHandle::completed(), move |_, v| {
                seen.store(v.len(), Ordering::Relaxed);
            })
        };
        reads.push((job, seen, i + 1));
    }

    for (job, seen, expected) in &reads {
        job.complete();
        assert_eq!(seen.load(Ordering::Relaxed), *expected);
    }

    assert_eq!(*value.read(), (0..16).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_value_guards() {
    let value = AccessControlledValue::new(1_u32);

    *value.write() += 41;
    assert_eq!(*value.read(), 42);
    assert!(!value.controller().is_acquired());

    let (wait, access) = value.acquire_async(AccessKind::SharedRead);
    assert!(wait.is_completed());
    assert_eq!(access.kind(), AccessKind::SharedRead);
    // Safety: the wait handle completed and nothing else is granted.
    assert_eq!(unsafe { *access.get() }, 42);
    value.release_async(&JobHandle::completed());
}

#[test]
#[should_panic(expected = "mutable access needs an exclusive grant")]
fn test_value_get_mut_needs_exclusive() {
    let value = AccessControlledValue::new(1_u32);
    let (_wait, mut access) = value.acquire_async(AccessKind::SharedWrite);
    // Safety: panics before touching the value.
    unsafe {
        *access.get_mut() = 2;
    }
}
