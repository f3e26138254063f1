//! Distributed training primitives.
//!
//! Training here is **data-parallel**: every replica holds the entire
//! model, each step hands every replica a different shard of the global
//! batch, and gradients are averaged across replicas with an
//! **all-reduce** before the (identical) parameter update. Replicas
//! therefore never diverge.
//!
//! Two pieces implement this:
//!
//! - [`CollectiveBackend`](backend::CollectiveBackend): the communication
//!   interface, with a [`CpuBackend`](cpu_backend::CpuBackend) that runs
//!   **ring all-reduce** over channels between replica threads. The ring
//!   moves `2 * (N - 1)` chunk-sized messages per rank regardless of
//!   world size, the same data movement a GPU collective library performs
//!   across device links.
//! - [`MirroredStrategy`](mirrored::MirroredStrategy): the device list
//!   and batch-sharding policy the estimator consults when a run config
//!   asks for replicated training.

pub mod backend;
pub mod cpu_backend;
pub mod mirrored;

pub use backend::CollectiveBackend;
pub use cpu_backend::CpuBackend;
pub use mirrored::{all_reduce_mean, available_devices, MirroredStrategy};
