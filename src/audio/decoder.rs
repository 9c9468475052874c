// Audio decoder using Symphonia
// Decodes one clip to interleaved f32 PCM, packet by packet

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::error::PlaybackError;
use crate::library::OpenClip;

pub struct AudioDecoder {
    clip: String,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_ms: Option<u64>,
}

impl AudioDecoder {
    /// Bind an opened clip to a decoder. The clip's file moves into the decoder
    /// and is closed when the decoder is dropped.
    pub fn open(clip: OpenClip) -> Result<Self, PlaybackError> {
        let mut hint = Hint::new();
        if let Some(ext) = clip.extension() {
            hint.with_extension(&ext);
        }

        let name = clip.name;
        let fail = |reason: String| PlaybackError::DecodeError {
            clip: name.clone(),
            reason,
        };

        let mss = MediaSourceStream::new(Box::new(clip.file), Default::default());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| fail(format!("failed to probe format: {}", e)))?;

        let format = probed.format;

        // First audio track only
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| fail("no audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

        let duration_ms = track
            .codec_params
            .n_frames
            .map(|frames| (frames as f64 / sample_rate as f64 * 1000.0) as u64);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| fail(format!("failed to create decoder: {}", e)))?;

        Ok(Self {
            clip: name,
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_ms,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Duration in milliseconds, when the container reports a frame count
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Decode the next packet into interleaved f32 samples.
    /// Returns None at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlaybackError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(self.fault(format!("failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    return Ok(Some(Self::audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt frame, the stream itself is still usable
                    tracing::warn!("Decode error in {} (skipping frame): {}", self.clip, e);
                    continue;
                }
                Err(e) => return Err(self.fault(format!("decode failed: {}", e))),
            }
        }
    }

    fn fault(&self, reason: String) -> PlaybackError {
        PlaybackError::DecodeError {
            clip: self.clip.clone(),
            reason,
        }
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave(b.planes(), b.frames(), |s: f32| s),
            AudioBufferRef::F64(b) => Self::interleave(b.planes(), b.frames(), |s: f64| s as f32),
            AudioBufferRef::S8(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i8| s as f32 / 128.0)
            }
            AudioBufferRef::S16(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i16| s as f32 / 32768.0)
            }
            AudioBufferRef::S24(b) => {
                Self::interleave(b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
            }
            AudioBufferRef::S32(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i32| s as f32 / 2147483648.0)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => {
                Self::interleave(b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
            }
            AudioBufferRef::U24(b) => Self::interleave(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave(b.planes(), b.frames(), |s: u32| {
                (s as f64 - 2147483648.0) as f32 / 2147483648.0
            }),
        }
    }

    fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let planes = planes.planes();
        if planes.is_empty() || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                interleaved.push(convert(plane[frame]));
            }
        }
        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ClipLibrary;
    use crate::test_support::write_wav;

    #[test]
    fn test_decode_wav_clip() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..800).map(|i| (i % 100) as i16 * 100).collect();
        write_wav(&dir.path().join("beep.wav"), 8000, 1, &samples);

        let library = ClipLibrary::new(dir.path());
        let mut decoder = AudioDecoder::open(library.open("beep.wav").unwrap()).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.duration_ms(), Some(100));

        let mut decoded = Vec::new();
        while let Some(chunk) = decoder.decode_next().unwrap() {
            decoded.extend(chunk);
        }
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[1] - 100.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk.mp3"), b"this is not audio").unwrap();

        let library = ClipLibrary::new(dir.path());
        let result = AudioDecoder::open(library.open("junk.mp3").unwrap());
        assert!(matches!(
            result,
            Err(PlaybackError::DecodeError { clip, .. }) if clip == "junk.mp3"
        ));
    }
}
