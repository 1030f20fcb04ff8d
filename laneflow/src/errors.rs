use crate::id::ContextId;

/// Errors raised while wiring drivers, streams and jobs together. Nothing on
/// the per-cycle path returns these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("resolve target `{type_name}` already registered for context {context}")]
    DuplicateResolveTarget {
        type_name: &'static str,
        context: ContextId,
    },

    #[error("no resolve target `{type_name}` registered for context {context}")]
    UnknownResolveTarget {
        type_name: &'static str,
        context: ContextId,
    },

    #[error("stream owned by context {owner} can't be used by driver {driver}")]
    ForeignStream { owner: ContextId, driver: ContextId },

    #[error("stream `{type_name}` already has an update job in driver {driver}")]
    DuplicateUpdateJob {
        type_name: &'static str,
        driver: ContextId,
    },

    #[error("stream `{type_name}` is not cancellable, it can't have a cancel continuation")]
    NotCancellable { type_name: &'static str },

    #[error("cancellable stream `{type_name}` has no update job in driver {driver}")]
    MissingUpdateJob {
        type_name: &'static str,
        driver: ContextId,
    },
}
