pub mod listener;
pub mod sample_ingest;

pub use listener::{serve, FrameDecoder};
pub use sample_ingest::SampleIngest;
