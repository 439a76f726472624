pub mod consumer;
pub mod producer;

pub use consumer::{BatchReport, CacheAction, InvalidationConsumer, classify};
pub use producer::EventProducer;
