pub mod decoder;
pub mod framing;
pub mod intake;
pub mod pause_detector;
pub mod resample;

pub use decoder::{AudioDecoder, DecoderChain, EncodedAudio};
