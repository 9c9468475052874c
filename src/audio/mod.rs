// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod convert;
pub mod decoder;
pub mod output;
pub mod player;
pub mod voice;

pub use output::{AudioOutput, PcmSink};
pub use player::{AudioPlaybackService, PlaybackOptions};
pub use voice::{PlaybackVoice, VoiceState};
