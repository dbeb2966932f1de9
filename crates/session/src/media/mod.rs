mod codecs;
mod session;
mod signaling;
mod worker_pool;

pub use codecs::media_codecs;
pub use session::{MediaSession, TransportDirection, TransportParams};
pub use signaling::ProducerSource;
pub use worker_pool::WorkerPool;
