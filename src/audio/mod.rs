// Audio module - amplitude frames in, calibrated decibel readings out

pub mod frame_queue;
pub mod level;
pub mod sampler;
pub mod wav;

// Re-export commonly used types for convenience
pub use frame_queue::{
    AudioFrame, FrameBatch, FrameConsumer, FrameProducer, FrameQueue, SourceSignal,
    DEFAULT_QUEUE_CAPACITY,
};
pub use sampler::DecibelSampler;
pub use wav::WavSource;
