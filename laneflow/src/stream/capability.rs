use super::stream::Inner;
use crate::id::{ActiveId, ContextId};
use crate::instance::{Entity, Entry, InstanceId};
use crate::job::Lane;
use std::fmt;
use std::sync::Arc;

/// Right to append to a stream's pending buffer, obtained with a shared-write
/// grant.
pub struct PendingWriter<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PendingWriter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PendingWriter<T> {
    pub(crate) fn new(inner: Arc<Inner<T>>) -> Self {
        Self { inner }
    }

    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn active_id(&self) -> ActiveId {
        self.inner.active_id
    }

    /// # Safety
    ///
    /// Only valid after the wait handle returned with this writer completed,
    /// and before the handle it was released with completes.
    #[track_caller]
    pub unsafe fn push(&self, lane: &Lane, entry: Entry<T>) {
        unsafe { self.inner.pending.push(lane, entry) }
    }

    /// Appends `payload` for `entity`, scoped to the owning stream.
    ///
    /// # Safety
    ///
    /// Same as [`PendingWriter::push`].
    #[track_caller]
    pub unsafe fn push_new(&self, lane: &Lane, entity: Entity, payload: T) {
        let id = InstanceId::new(entity, self.inner.context, self.inner.active_id);
        unsafe { self.push(lane, Entry::new(id, payload)) }
    }
}

impl<T> fmt::Debug for PendingWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWriter")
            .field("context", &self.inner.context)
            .field("active_id", &self.inner.active_id)
            .finish()
    }
}

/// Right to read a stream's live array, obtained with a shared-read grant.
pub struct LiveReader<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for LiveReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> LiveReader<T> {
    pub(crate) fn new(inner: Arc<Inner<T>>) -> Self {
        Self { inner }
    }

    /// Live records. Evaluated when called, i.e. when the reading job runs.
    ///
    /// # Safety
    ///
    /// Only valid after the wait handle returned with this reader completed,
    /// and before the handle it was released with completes.
    pub unsafe fn as_slice(&self) -> &[Entry<T>] {
        unsafe { self.inner.live.as_slice() }
    }
}

impl<T> fmt::Debug for LiveReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveReader")
            .field("context", &self.inner.context)
            .finish_non_exhaustive()
    }
}

/// Appends to one lane of a stream from inside a job holding a shared-write
/// grant.
pub struct Appender<'a, T> {
    writer: &'a PendingWriter<T>,
    lane: Lane,
}

impl<'a, T> Appender<'a, T> {
    /// # Safety
    ///
    /// The grant `writer` was obtained with is held for `'a`.
    pub(crate) unsafe fn new(writer: &'a PendingWriter<T>, lane: Lane) -> Self {
        Self { writer, lane }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn push(&self, entity: Entity, payload: T) {
        // Safety: see `Appender::new`.
        unsafe { self.writer.push_new(&self.lane, entity, payload) }
    }

    pub fn push_entry(&self, entry: Entry<T>) {
        // Safety: see `Appender::new`.
        unsafe { self.writer.push(&self.lane, entry) }
    }
}
