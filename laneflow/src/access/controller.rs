use crate::job::JobHandle;
use parking_lot::Mutex;
use std::fmt;

/// How a job intends to touch a resource.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AccessKind {
    SharedRead,

    /// Concurrent appends, e.g. to distinct lanes of a pending buffer.
    SharedWrite,

    ExclusiveWrite,

    /// Last access to the resource, nothing can be acquired after it.
    Disposal,
}

impl AccessKind {
    pub fn is_shared(self) -> bool {
        matches!(self, AccessKind::SharedRead | AccessKind::SharedWrite)
    }

    pub fn is_compatible_with(self, other: AccessKind) -> bool {
        self.is_shared() && other.is_shared()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    None,
    Shared(usize),
    Exclusive,
    Disposal,
    Disposed,
}

#[derive(Debug)]
struct State {
    /// Release handle of the last exclusive grant.
    last_writer: JobHandle,

    /// Combined release handles of every shared grant since the last exclusive
    /// grant.
    last_reader: JobHandle,

    grant: Grant,
}

/// Turns access requests on a resource into job dependencies.
///
/// Acquiring returns the handle to wait on before touching the resource,
/// releasing takes the handle of the work that touched it. Shared grants wait
/// on the last exclusive release, exclusive grants wait on everything.
///
/// Bookkeeping happens on the coordinating thread: acquire and release are
/// expected to be paired before the next exclusive acquire.
pub struct AccessController {
    state: Mutex<State>,
}

impl Default for AccessController {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                last_writer: JobHandle::completed(),
                last_reader: JobHandle::completed(),
                grant: Grant::None,
            }),
        }
    }

    /// Grants `kind` and returns the handle to wait on before touching the
    /// resource.
    ///
    /// # Panics
    ///
    /// On exclusive or disposal access while any grant is outstanding, on any
    /// access while an exclusive grant is outstanding, and on any access after
    /// disposal.
    #[track_caller]
    pub fn acquire_async(&self, kind: AccessKind) -> JobHandle {
        let mut state = self.state.lock();

        match (kind.is_shared(), state.grant) {
            (_, Grant::Disposal | Grant::Disposed) => {
                panic!("{kind:?} access requested on a disposed resource")
            }
            (true, Grant::None) => {
                state.grant = Grant::Shared(1);
                state.last_writer.clone()
            }
            (true, Grant::Shared(n)) => {
                state.grant = Grant::Shared(n + 1);
                state.last_writer.clone()
            }
            (true, Grant::Exclusive) => {
                panic!("{kind:?} access requested while an exclusive grant is outstanding")
            }
            (false, Grant::None) => {
                state.grant = if kind == AccessKind::Disposal {
                    Grant::Disposal
                } else {
                    Grant::Exclusive
                };
                JobHandle::combine([&state.last_writer, &state.last_reader])
            }
            (false, grant) => {
                panic!("{kind:?} access requested while {grant:?} is outstanding")
            }
        }
    }

    /// Synchronous acquire: blocks until the resource can be touched.
    #[track_caller]
    pub fn acquire(&self, kind: AccessKind) -> JobHandle {
        let handle = self.acquire_async(kind);
        handle.complete();
        handle
    }

    /// Releases one outstanding grant. `handle` completes once the work
    /// touching the resource is done.
    ///
    /// # Panics
    ///
    /// If no grant is outstanding.
    #[track_caller]
    pub fn release_async(&self, handle: &JobHandle) {
        let mut state = self.state.lock();

        match state.grant {
            Grant::Shared(n) => {
                state.last_reader = JobHandle::combine([&state.last_reader, handle]);
                state.grant = if n == 1 {
                    Grant::None
                } else {
                    Grant::Shared(n - 1)
                };
            }
            Grant::Exclusive => {
                state.last_writer = handle.clone();
                state.last_reader = handle.clone();
                state.grant = Grant::None;
            }
            Grant::Disposal => {
                state.last_writer = handle.clone();
                state.last_reader = handle.clone();
                state.grant = Grant::Disposed;
            }
            Grant::None | Grant::Disposed => {
                panic!("release without an outstanding grant")
            }
        }
    }

    /// Releases a grant whose work was done inline by the caller.
    #[track_caller]
    pub fn release(&self) {
        self.release_async(&JobHandle::completed());
    }

    /// Synchronous acquire released when the guard drops.
    #[track_caller]
    pub fn acquire_scoped(&self, kind: AccessKind) -> AccessGuard<'_> {
        self.acquire(kind);
        AccessGuard { controller: self }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().grant == Grant::Disposed
    }

    pub fn is_acquired(&self) -> bool {
        !matches!(self.state.lock().grant, Grant::None | Grant::Disposed)
    }
}

impl fmt::Debug for AccessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AccessController")
            .field("grant", &state.grant)
            .field("last_writer", &state.last_writer)
            .field("last_reader", &state.last_reader)
            .finish()
    }
}

/// Releases its grant on drop.
#[must_use = "the grant is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct AccessGuard<'a> {
    controller: &'a AccessController,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.controller.release();
    }
}
