use crate::job::{Lane, Lanes};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;

/// Append-only buffer with one independent segment per lane.
///
/// Appends to different lanes never contend: each lane sits on its own cache
/// line and is only ever written by the thread owning that [`Lane`]. The
/// buffer itself takes no lock, callers order appends and drains through an
/// [`AccessController`](crate::access::AccessController):
///
/// - appends under a shared-write grant,
/// - reads of the whole buffer, drains and clears under an exclusive grant.
pub struct LaneBuffer<T> {
    lanes: Lanes,
    segments: Box<[CachePadded<UnsafeCell<Vec<T>>>]>,
}

// Safety: a segment is only mutated by the thread owning its lane, or by the
// holder of an exclusive grant.
unsafe impl<T: Send + Sync> Sync for LaneBuffer<T> {}

impl<T> LaneBuffer<T> {
    pub fn new(lanes: Lanes) -> Self {
        let segments = (0..lanes.count())
            .map(|_| CachePadded::new(UnsafeCell::new(Vec::new())))
            .collect();

        Self { lanes, segments }
    }

    pub fn lanes(&self) -> Lanes {
        self.lanes
    }

    #[track_caller]
    fn segment(&self, lane: &Lane) -> *mut Vec<T> {
        assert_eq!(
            lane.pool(),
            self.lanes.pool(),
            "lane belongs to another runtime"
        );
        self.segments[lane.index()].get()
    }

    /// Appends `value` to `lane`.
    ///
    /// # Safety
    ///
    /// Caller holds a shared-write grant on the buffer.
    #[track_caller]
    pub unsafe fn push(&self, lane: &Lane, value: T) {
        let segment = self.segment(lane);
        unsafe { (*segment).push(value) }
    }

    /// # Safety
    ///
    /// Same as [`LaneBuffer::push`].
    #[track_caller]
    pub unsafe fn extend<I>(&self, lane: &Lane, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        let segment = self.segment(lane);
        unsafe { (*segment).extend(values) }
    }

    /// Total number of entries across lanes.
    ///
    /// # Safety
    ///
    /// Caller holds a grant excluding shared writes.
    pub unsafe fn len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| unsafe { (*s.get()).len() })
            .sum()
    }

    /// # Safety
    ///
    /// Same as [`LaneBuffer::len`].
    pub unsafe fn is_empty(&self) -> bool {
        unsafe { self.len() == 0 }
    }

    /// Entries of one lane, in append order.
    ///
    /// # Safety
    ///
    /// Same as [`LaneBuffer::len`].
    pub unsafe fn lane(&self, index: usize) -> &[T] {
        unsafe { &*self.segments[index].get() }
    }

    /// Moves every entry into `out`, lane by lane, preserving append order
    /// within a lane. Lanes keep their capacity. Returns how many entries were
    /// moved.
    ///
    /// # Safety
    ///
    /// Caller holds an exclusive grant.
    pub unsafe fn drain_into(&self, out: &mut Vec<T>) -> usize {
        // Two passes: count, then move.
        let count = unsafe { self.len() };
        out.reserve(count);

        for segment in self.segments.iter() {
            out.append(unsafe { &mut *segment.get() });
        }

        count
    }

    /// # Safety
    ///
    /// Caller holds an exclusive grant.
    pub unsafe fn for_each_mut<F>(&self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        for segment in self.segments.iter() {
            unsafe { (*segment.get()).iter_mut().for_each(&mut f) }
        }
    }

    /// # Safety
    ///
    /// Caller holds an exclusive grant.
    pub unsafe fn clear(&self) {
        for segment in self.segments.iter() {
            unsafe { (*segment.get()).clear() }
        }
    }
}

impl<T> fmt::Debug for LaneBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneBuffer")
            .field("lanes", &self.lanes.count())
            .finish_non_exhaustive()
    }
}
