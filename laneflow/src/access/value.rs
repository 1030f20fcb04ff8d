use crate::access::{AccessController, AccessKind};
use crate::job::{JobContext, JobHandle};
use crate::runtime::Runtime;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct Inner<T> {
    controller: AccessController,
    value: UnsafeCell<T>,
}

// Safety: every access to `value` goes through a grant of `controller`, which
// orders exclusive access after all shared access.
unsafe impl<T: Send + Sync> Sync for Inner<T> {}

/// A value paired with its own [`AccessController`].
///
/// Cloning shares the value.
pub struct AccessControlledValue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AccessControlledValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> AccessControlledValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                controller: AccessController::new(),
                value: UnsafeCell::new(value),
            }),
        }
    }

    pub fn controller(&self) -> &AccessController {
        &self.inner.controller
    }

    /// Grants `kind` and returns the handle to wait on with the capability to
    /// use once it completed.
    #[track_caller]
    pub fn acquire_async(&self, kind: AccessKind) -> (JobHandle, ValueAccess<T>) {
        let handle = self.inner.controller.acquire_async(kind);
        let access = ValueAccess {
            inner: Arc::clone(&self.inner),
            kind,
        };
        (handle, access)
    }

    #[track_caller]
    pub fn release_async(&self, handle: &JobHandle) {
        self.inner.controller.release_async(handle);
    }

    /// Schedules `f` with shared access to the value.
    pub fn schedule_read<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &T) + Send + 'static,
    {
        let (wait, access) = self.acquire_async(AccessKind::SharedRead);
        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |ctx| {
            // Safety: runs after the SharedRead grant's wait handle, released
            // with this job's handle.
            f(ctx, unsafe { access.get() })
        });
        self.release_async(&job);
        job
    }

    /// Schedules `f` with exclusive access to the value.
    pub fn schedule_write<F>(&self, rt: &Runtime, dependency: &JobHandle, f: F) -> JobHandle
    where
        F: FnOnce(&JobContext, &mut T) + Send + 'static,
    {
        let (wait, mut access) = self.acquire_async(AccessKind::ExclusiveWrite);
        let job = rt.schedule(&JobHandle::combine([dependency, &wait]), move |ctx| {
            // Safety: runs after the ExclusiveWrite grant's wait handle, released
            // with this job's handle.
            f(ctx, unsafe { access.get_mut() })
        });
        self.release_async(&job);
        job
    }

    /// Blocks until shared access is granted.
    #[track_caller]
    pub fn read(&self) -> ReadGuard<'_, T> {
        self.inner.controller.acquire(AccessKind::SharedRead);
        ReadGuard { value: self }
    }

    /// Blocks until exclusive access is granted.
    #[track_caller]
    pub fn write(&self) -> WriteGuard<'_, T> {
        self.inner.controller.acquire(AccessKind::ExclusiveWrite);
        WriteGuard { value: self }
    }
}

impl<T> fmt::Debug for AccessControlledValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessControlledValue")
            .field("controller", &self.inner.controller)
            .finish_non_exhaustive()
    }
}

/// Capability handed out by [`AccessControlledValue::acquire_async`].
pub struct ValueAccess<T> {
    inner: Arc<Inner<T>>,
    kind: AccessKind,
}

impl<T> ValueAccess<T> {
    pub fn kind(&self) -> AccessKind {
        self.kind
    }

    /// # Safety
    ///
    /// Only valid after the wait handle returned with this capability
    /// completed, and before the handle it was released with completes.
    pub unsafe fn get(&self) -> &T {
        unsafe { &*self.inner.value.get() }
    }

    /// # Safety
    ///
    /// Same as [`ValueAccess::get`].
    ///
    /// # Panics
    ///
    /// Unless the capability was granted for exclusive write.
    #[track_caller]
    pub unsafe fn get_mut(&mut self) -> &mut T {
        assert_eq!(
            self.kind,
            AccessKind::ExclusiveWrite,
            "mutable access needs an exclusive grant"
        );
        unsafe { &mut *self.inner.value.get() }
    }
}

pub struct ReadGuard<'a, T> {
    value: &'a AccessControlledValue<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the shared grant completed in `read()` and is held until drop.
        unsafe { &*self.value.inner.value.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.value.inner.controller.release();
    }
}

pub struct WriteGuard<'a, T> {
    value: &'a AccessControlledValue<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the exclusive grant completed in `write()` and is held until drop.
        unsafe { &*self.value.inner.value.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: see `deref`.
        unsafe { &mut *self.value.inner.value.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.value.inner.controller.release();
    }
}
