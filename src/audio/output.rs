// Audio output using cpal
// Decoded PCM is handed to the device callback through a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PlaybackError;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Destination for the voice's PCM frames
pub trait PcmSink {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Output gain applied to every sample (0.0 to 1.0)
    fn set_level(&self, level: f32);

    /// Queue interleaved samples, blocking while the sink is full
    fn write_blocking(&self, samples: &[f32]);

    /// Samples queued but not yet played
    fn pending(&self) -> usize;
}

pub struct AudioOutput {
    _stream: Stream,
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    level: Arc<Mutex<f32>>,
}

impl AudioOutput {
    /// Open the default output device
    pub fn new() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Output("no output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| PlaybackError::Output(format!("failed to get default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let level = Arc::new(Mutex::new(1.0f32));
        let level_clone = level.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, level_clone)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, level_clone)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, level_clone)?
            }
            format => {
                return Err(PlaybackError::Output(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| PlaybackError::Output(format!("failed to start stream: {}", e)))?;

        tracing::info!("Audio output ready: {} Hz, {} channel(s)", sample_rate, channels);

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
            level,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        level: Arc<Mutex<f32>>,
    ) -> Result<Stream, PlaybackError> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let gain = *level.lock();

                    // Underruns play silence
                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * gain;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    tracing::error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::Output(format!("failed to build output stream: {}", e)))
    }

    /// Write samples to the output buffer.
    /// Returns the number of samples actually written
    fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        producer.push_slice(samples)
    }
}

impl PcmSink for AudioOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_level(&self, level: f32) {
        *self.level.lock() = level.clamp(0.0, 1.0);
    }

    fn write_blocking(&self, samples: &[f32]) {
        let mut remaining = samples;

        while !remaining.is_empty() {
            let written = self.write(remaining);
            if written > 0 {
                remaining = &remaining[written..];
            } else {
                // Buffer full, wait for the device to catch up
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn pending(&self) -> usize {
        self.producer.lock().occupied_len()
    }
}
