//! Audio streaming: jitter buffer and the paced drain feeding the transport.

pub mod audio_buffer;
pub mod pacer;

pub use audio_buffer::{AudioStreamBuffer, BufferPolicy, BufferStats};
pub use pacer::{AudioPacer, PacerHandle, SharedAudioBuffer};
