//! Memory state owned by this process: the activation index, decay scoring,
//! the short-term buffer and pruning.

pub mod activation;
pub mod decay;
pub mod detect;
pub mod retention;
pub mod stm;

pub use activation::{
    ActivationEntry, ActivationIndex, ActivationStats, MemoryType, RegisterOptions,
    ACTIVATION_INDEX_VERSION,
};
pub use decay::{
    classify_tier, days_since_access, decay_score, is_immune, DecayTier, TypeWeights,
    DEFAULT_DECAY_RATE,
};
pub use detect::detect_memory_type;
pub use retention::{prune_index, PrunePolicy, PruneReport};
pub use stm::{clamp_excerpt, StmBuffer, StmEntry, STM_BUFFER_VERSION};
