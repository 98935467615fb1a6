//! Decoding of listening assets
//!
//! Uses symphonia for format-agnostic decoding (MP3, M4A, OGG, FLAC, WAV) of an
//! in-memory asset into interleaved f32 samples.

use crate::error::{ExamError, Result};
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio, interleaved f32 in `[-1.0, 1.0]`
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decode a complete asset. `extension` is a format hint (e.g. "mp3").
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(ExamError::PlaybackError("audio asset is empty".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ExamError::PlaybackError(format!("Unsupported audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExamError::PlaybackError("No supported audio track".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params.sample_rate.ok_or_else(|| {
        ExamError::PlaybackError("Cannot determine sample rate of audio asset".to_string())
    })?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ExamError::PlaybackError(format!("Unsupported audio codec: {}", e)))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(ExamError::PlaybackError(format!(
                    "Error reading audio: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, not fatal
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(ExamError::PlaybackError(format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();

        let sbuf =
            sample_buf.get_or_insert_with(|| SampleBuffer::<f32>::new(num_frames as u64, spec));
        if sbuf.capacity() < num_frames {
            *sbuf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        }

        sbuf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sbuf.samples());
    }

    if samples.is_empty() {
        return Err(ExamError::PlaybackError(
            "audio asset contains no decodable samples".to_string(),
        ));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
