pub mod backend;
pub mod capture;
pub mod decode;
pub mod file;
pub mod playback;
pub mod recording;

#[cfg(feature = "cpal")]
pub mod device;

pub use backend::{AudioFrame, CaptureConfig, MicrophoneBackend};
pub use capture::MediaCaptureController;
pub use decode::{decode_bytes, DecodedAudio};
pub use file::{AudioFile, FileMicrophone};
pub use playback::{
    AudioOutput, AudioPlayback, FinishedFn, HttpAudioPlayer, PacedOutput, PlaybackRequest,
};
pub use recording::{Recording, RecordingBuilder};

#[cfg(feature = "cpal")]
pub use device::{CpalMicrophone, CpalSpeaker};
