//! Corpus access, speaker lists and batch production

mod batch;
mod corpus;
mod queue;
mod sampler;
mod spklist;

pub use batch::{Batch, Shard};
pub use corpus::{FeatureSource, InMemoryCorpus, KaldiCorpus, SelectedDim, Utterances};
pub use queue::{BatchQueue, BatchSource, QueueConfig};
pub use sampler::{batch_rng, BatchSampler, SamplerConfig};
pub use spklist::SpeakerIndex;
