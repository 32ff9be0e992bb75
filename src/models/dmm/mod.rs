pub mod attention;
pub mod combiner;
pub mod emitter;
pub mod transition;

pub use attention::{PredicterAttention, PredicterAttentionConfig};
pub use combiner::{Combiner, CombinerConfig};
pub use emitter::{Emitter, EmitterConfig};
pub use transition::{GatedTransition, GatedTransitionConfig};
