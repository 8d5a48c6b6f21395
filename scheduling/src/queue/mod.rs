pub mod generator;
pub mod store;

pub use generator::{generate_queue, QueueCandidate};
pub use store::{AddManualOutcome, QueueStore};
