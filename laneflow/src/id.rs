//! Owner and active identifiers.
//!
//! Every [`TaskDriver`] gets a [`ContextId`] and every stream gets an
//! [`ActiveId`], both minted by the [`IdProvider`] owned by the [`Runtime`]
//! session. The value `0` is reserved as "unset" and is never handed out.
//!
//! [`TaskDriver`]: crate::driver::TaskDriver
//! [`Runtime`]: crate::runtime::Runtime
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Default threshold after which [`IdProvider::has_exceeded_warning_threshold`]
/// starts reporting `true`. Leaves one million ids of headroom.
pub const DEFAULT_WARNING_THRESHOLD: u32 = u32::MAX - 1_000_000;

/// Monotonic `u32` id source.
///
/// Ids are unique for the lifetime of the provider, which is tied to the
/// [`Runtime`](crate::runtime::Runtime) that owns it. The first id is `1`.
#[derive(Debug)]
pub struct IdProvider {
    next: AtomicU32,
    warning_threshold: u32,

    // Only log the threshold crossing once, callers are expected to poll.
    warned: AtomicBool,
}

impl Default for IdProvider {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_THRESHOLD)
    }
}

impl IdProvider {
    pub fn new(warning_threshold: u32) -> Self {
        Self::starting_at(1, warning_threshold)
    }

    pub(crate) fn starting_at(first: u32, warning_threshold: u32) -> Self {
        assert!(first > 0, "0 is reserved as the unset id");
        Self {
            next: AtomicU32::new(first),
            warning_threshold,
            warned: AtomicBool::new(false),
        }
    }

    /// Returns the next id. Never returns `0`.
    ///
    /// # Panics
    ///
    /// Panics once the `u32` space is exhausted instead of wrapping around and
    /// handing out duplicates.
    pub fn next_id(&self) -> u32 {
        // Once u32::MAX is handed out the counter parks at 0 and stays there.
        let id = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                (id != 0).then_some(id.wrapping_add(1))
            })
            .unwrap_or_else(|_| Self::exhausted());

        if id >= self.warning_threshold && !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                id,
                threshold = self.warning_threshold,
                "id provider crossed its warning threshold"
            );
        }

        id
    }

    pub fn next_context_id(&self) -> ContextId {
        ContextId(NonZeroU32::new(self.next_id()).unwrap_or_else(|| Self::exhausted()))
    }

    pub fn next_active_id(&self) -> ActiveId {
        ActiveId(self.next_id())
    }

    /// Whether the provider has handed out ids at or beyond its warning
    /// threshold. There is no push notification, callers poll this.
    pub fn has_exceeded_warning_threshold(&self) -> bool {
        let next = self.next.load(Ordering::Relaxed);
        next == 0 || next > self.warning_threshold
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique id: u32 space exhausted")
    }
}

/// Identifies the owner (a driver) a stream or record is scoped to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ContextId(NonZeroU32);

impl ContextId {
    pub fn as_u32(&self) -> u32 {
        self.0.get()
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u32) -> Self {
        ContextId(NonZeroU32::new(id).expect("context id can't be 0"))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Informational id carried by records. Used to patch and remap records, never
/// for identity.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ActiveId(u32);

impl ActiveId {
    pub const UNSET: ActiveId = ActiveId(0);

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ActiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use static_assertions::assert_impl_all;
    use std::collections::HashSet;
    use std::sync::Arc;

    assert_impl_all!(IdProvider: Send, Sync);

    #[rstest]
    #[case::one(1)]
    #[case::few(13)]
    #[case::many(10_000)]
    fn test_ids_strictly_increase_from_one(#[case] n: usize) {
        let ids = IdProvider::default();
        let all = (0..n).map(|_| ids.next_id()).collect::<Vec<_>>();

        assert_eq!(all[0], 1);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), n);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(IdProvider::default());

        let handles = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1_000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();

        let all = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(all.len(), 4_000);
        assert!(!all.contains(&0));
    }

    #[test]
    fn test_warning_threshold_is_pollable() {
        let ids = IdProvider::starting_at(98, 100);
        assert!(!ids.has_exceeded_warning_threshold());

        assert_eq!(ids.next_id(), 98);
        assert_eq!(ids.next_id(), 99);
        assert!(!ids.has_exceeded_warning_threshold());

        assert_eq!(ids.next_id(), 100);
        assert!(ids.has_exceeded_warning_threshold());
    }

    #[test]
    fn test_last_id_is_u32_max() {
        let ids = IdProvider::starting_at(u32::MAX, DEFAULT_WARNING_THRESHOLD);
        assert_eq!(ids.next_id(), u32::MAX);
        assert!(ids.has_exceeded_warning_threshold());
    }

    #[test]
    #[should_panic(expected = "u32 space exhausted")]
    fn test_exhaustion_panics_instead_of_wrapping() {
        let ids = IdProvider::starting_at(u32::MAX, DEFAULT_WARNING_THRESHOLD);
        ids.next_id();
        ids.next_id();
    }

    #[test]
    fn test_exhausted_provider_never_recovers() {
        let ids = IdProvider::starting_at(u32::MAX, DEFAULT_WARNING_THRESHOLD);
        assert_eq!(ids.next_id(), u32::MAX);

        for _ in 0..3 {
            let res = std::panic::catch_unwind(|| ids.next_id());
            assert!(res.is_err());
            assert!(ids.has_exceeded_warning_threshold());
        }
        assert!(std::panic::catch_unwind(|| ids.next_context_id()).is_err());
    }

    #[test]
    fn test_typed_ids_share_the_counter() {
        let ids = IdProvider::default();
        let ctx = ids.next_context_id();
        let active = ids.next_active_id();

        assert_eq!(ctx.as_u32(), 1);
        assert_eq!(active.as_u32(), 2);
        assert!(ActiveId::UNSET.is_unset());
        assert!(!active.is_unset());
    }
}
