// Sample format conversion between a clip and the output device
// Channel remix first, then rubato resampling when the rates differ

use rubato::{FftFixedIn, Resampler};

use crate::error::PlaybackError;

/// Input frames per resampler chunk
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

pub struct FormatConverter {
    in_channels: usize,
    out_channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    /// Remixed, deinterleaved frames waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
}

impl FormatConverter {
    pub fn new(
        in_rate: u32,
        in_channels: usize,
        out_rate: u32,
        out_channels: usize,
    ) -> Result<Self, PlaybackError> {
        let in_channels = in_channels.max(1);
        let out_channels = out_channels.max(1);

        let resampler = if in_rate != out_rate {
            let resampler = FftFixedIn::<f32>::new(
                in_rate as usize,
                out_rate as usize,
                RESAMPLE_CHUNK_FRAMES,
                2,
                out_channels,
            )
            .map_err(|e| PlaybackError::Output(format!("failed to create resampler: {}", e)))?;
            Some(resampler)
        } else {
            None
        };

        Ok(Self {
            in_channels,
            out_channels,
            resampler,
            pending: vec![Vec::new(); out_channels],
        })
    }

    /// Convert one block of interleaved clip samples into interleaved device samples.
    /// With resampling active, output may lag input until `finish` is called.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, PlaybackError> {
        let remixed = self.remix(interleaved);

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(remixed);
        };

        for frame in remixed.chunks_exact(self.out_channels) {
            for (channel, sample) in frame.iter().enumerate() {
                self.pending[channel].push(*sample);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();

            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| PlaybackError::Output(format!("resampling failed: {}", e)))?;
            Self::interleave_into(&resampled, &mut output);
        }

        Ok(output)
    }

    /// Flush whatever the resampler still holds at the end of a clip
    pub fn finish(&mut self) -> Result<Vec<f32>, PlaybackError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let tail: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let resampled = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| PlaybackError::Output(format!("resampling failed: {}", e)))?;

        let mut output = Vec::new();
        Self::interleave_into(&resampled, &mut output);
        Ok(output)
    }

    fn remix(&self, interleaved: &[f32]) -> Vec<f32> {
        if self.in_channels == self.out_channels {
            return interleaved.to_vec();
        }

        let frames = interleaved.len() / self.in_channels;
        let mut out = Vec::with_capacity(frames * self.out_channels);

        for frame in interleaved.chunks_exact(self.in_channels) {
            if self.in_channels == 1 {
                out.extend(std::iter::repeat(frame[0]).take(self.out_channels));
            } else if self.out_channels == 1 {
                out.push(frame.iter().sum::<f32>() / self.in_channels as f32);
            } else {
                // Extra device channels are silent, extra clip channels are dropped
                for channel in 0..self.out_channels {
                    out.push(frame.get(channel).copied().unwrap_or(0.0));
                }
            }
        }
        out
    }

    fn interleave_into(planes: &[Vec<f32>], out: &mut Vec<f32>) {
        let frames = planes.first().map(|p| p.len()).unwrap_or(0);
        out.reserve(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                out.push(plane[frame]);
            }
        }
    }
}
