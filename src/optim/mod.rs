//! Optimizers and learning rate schedules

mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
pub use scheduler::{sweep_schedule, GeometricSweepLR, LRScheduler, LinearSweepLR};
pub use sgd::SGD;
