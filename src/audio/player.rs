// Audio playback service
// One voice, one clip at a time. Playing a clip blocks the caller until it ends.

use parking_lot::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::convert::FormatConverter;
use crate::audio::decoder::AudioDecoder;
use crate::audio::output::PcmSink;
use crate::audio::voice::{PlaybackVoice, VoiceState};
use crate::error::PlaybackError;
use crate::library::ClipLibrary;

type StateListener = Box<dyn Fn(VoiceState) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Gain the voice is set to when a clip starts
    pub level: f32,
    /// How often the end of playback is checked
    pub poll_interval: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            level: 0.65,
            poll_interval: Duration::from_millis(10),
        }
    }
}

pub struct AudioPlaybackService<S> {
    library: ClipLibrary,
    sink: S,
    options: PlaybackOptions,
    voice: Mutex<PlaybackVoice>,
    idle: Condvar,
    listener: Option<StateListener>,
}

/// Holds the voice for one playback and hands it back on drop,
/// whichever way `play_clip` exits
struct VoiceClaim<'a, S> {
    service: &'a AudioPlaybackService<S>,
}

impl<S> Drop for VoiceClaim<'_, S> {
    fn drop(&mut self) {
        self.service.release();
    }
}

impl<S> AudioPlaybackService<S> {
    pub fn new(library: ClipLibrary, sink: S, options: PlaybackOptions) -> Self {
        let voice = PlaybackVoice::new(options.level);
        Self {
            library,
            sink,
            options,
            voice: Mutex::new(voice),
            idle: Condvar::new(),
            listener: None,
        }
    }

    /// Observe every voice phase change. Called with the voice locked,
    /// so the listener must not call back into the service.
    pub fn with_state_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(VoiceState) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_playing(&self) -> bool {
        self.voice.lock().active()
    }

    /// Snapshot of the voice
    pub fn voice(&self) -> PlaybackVoice {
        self.voice.lock().clone()
    }

    /// Wait for the voice to go idle, then claim it for `clip`
    fn claim(&self, clip: &str) -> VoiceClaim<'_, S> {
        let mut voice = self.voice.lock();
        while voice.active() {
            tracing::debug!("Voice busy, {} waits for the current clip", clip);
            self.idle.wait(&mut voice);
        }
        voice.load(clip);
        self.notify(VoiceState::Loading);
        VoiceClaim { service: self }
    }

    fn start(&self) {
        let mut voice = self.voice.lock();
        voice.start(self.options.level);
        self.notify(VoiceState::Playing);
    }

    fn release(&self) {
        let mut voice = self.voice.lock();
        voice.release();
        self.notify(VoiceState::Idle);
        drop(voice);
        self.idle.notify_all();
    }

    fn notify(&self, state: VoiceState) {
        if let Some(listener) = &self.listener {
            listener(state);
        }
    }
}

impl<S: PcmSink> AudioPlaybackService<S> {
    /// Play a clip by name and return once it has finished playing.
    ///
    /// If another clip holds the voice, this waits for it to finish first.
    pub fn play_clip(&self, name: &str) -> Result<(), PlaybackError> {
        let _claim = self.claim(name);

        let clip = self.library.open(name)?;
        let mut decoder = AudioDecoder::open(clip)?;
        let mut converter = FormatConverter::new(
            decoder.sample_rate(),
            decoder.channels(),
            self.sink.sample_rate(),
            self.sink.channels() as usize,
        )?;

        self.sink.set_level(self.options.level);
        self.start();

        match decoder.duration_ms() {
            Some(ms) => tracing::info!("Playing {}! ({} ms)", name, ms),
            None => tracing::info!("Playing {}!", name),
        }

        while let Some(samples) = decoder.decode_next()? {
            let frames = converter.process(&samples)?;
            self.sink.write_blocking(&frames);
        }
        self.sink.write_blocking(&converter.finish()?);

        // Decoder (and the clip file) go away before we wait out the tail
        drop(decoder);
        self.wait_until_drained();

        tracing::debug!("Finished {}", name);
        Ok(())
    }

    fn wait_until_drained(&self) {
        while self.sink.pending() > 0 {
            thread::sleep(self.options.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_wav, MemorySink};
    use std::sync::Arc;

    fn tone(frames: usize) -> Vec<i16> {
        (0..frames).map(|i| ((i % 50) as i16 - 25) * 500).collect()
    }

    fn service_with_clips(
        sink: MemorySink,
        clips: &[&str],
    ) -> (
        tempfile::TempDir,
        AudioPlaybackService<MemorySink>,
        Arc<Mutex<Vec<VoiceState>>>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        for clip in clips {
            write_wav(&dir.path().join(clip), 8000, 1, &tone(400));
        }
        let states = Arc::new(Mutex::new(Vec::new()));
        let recorded = states.clone();
        let service = AudioPlaybackService::new(
            ClipLibrary::new(dir.path()),
            sink,
            PlaybackOptions {
                level: 0.65,
                poll_interval: Duration::from_millis(1),
            },
        )
        .with_state_listener(move |state| recorded.lock().push(state));
        (dir, service, states)
    }

    #[test]
    fn test_play_clip_runs_voice_through_all_phases() {
        let (_dir, service, states) = service_with_clips(MemorySink::new(8000, 1), &["hi.mp3"]);

        service.play_clip("hi.mp3").unwrap();

        assert_eq!(
            *states.lock(),
            vec![VoiceState::Loading, VoiceState::Playing, VoiceState::Idle]
        );
        assert_eq!(service.sink().samples().len(), 400);
        assert!((service.sink().level() - 0.65).abs() < f32::EPSILON);
        assert!(!service.is_playing());
        assert_eq!(service.voice().source, None);
    }

    #[test]
    fn test_missing_clip_releases_voice() {
        let (_dir, service, states) = service_with_clips(MemorySink::new(8000, 1), &[]);

        let err = service.play_clip("missing.mp3").unwrap_err();

        assert!(matches!(err, PlaybackError::ClipNotFound(name) if name == "missing.mp3"));
        assert_eq!(*states.lock(), vec![VoiceState::Loading, VoiceState::Idle]);
        assert!(!service.is_playing());
        assert!(service.sink().samples().is_empty());
    }

    #[test]
    fn test_corrupt_clip_is_decode_error() {
        let (dir, service, _states) = service_with_clips(MemorySink::new(8000, 1), &[]);
        std::fs::write(dir.path().join("bad.mp3"), b"not an mp3 at all").unwrap();

        let err = service.play_clip("bad.mp3").unwrap_err();

        assert!(matches!(err, PlaybackError::DecodeError { .. }));
        assert!(!service.voice().active());
    }

    #[test]
    fn test_clip_is_converted_to_sink_format() {
        let (_dir, service, _states) =
            service_with_clips(MemorySink::new(8000, 2), &["hi.mp3"]);

        service.play_clip("hi.mp3").unwrap();

        let samples = service.sink().samples();
        assert_eq!(samples.len(), 800);
        assert_eq!(samples[0], samples[1]);
    }

    #[test]
    fn test_play_clip_waits_for_sink_to_drain() {
        let sink = MemorySink::new(8000, 1).with_backlog(500, 50);
        let (_dir, service, states) = service_with_clips(sink, &["hi.mp3"]);

        service.play_clip("hi.mp3").unwrap();

        assert_eq!(service.sink().backlog(), 0);
        assert_eq!(service.sink().pending_polls(), 10);
        assert_eq!(states.lock().last(), Some(&VoiceState::Idle));
    }

    #[test]
    fn test_concurrent_requests_are_serialized() {
        let sink = MemorySink::new(8000, 1).with_write_delay(Duration::from_millis(2));
        let (_dir, service, states) = service_with_clips(sink, &["a.mp3", "b.mp3"]);
        let service = Arc::new(service);

        let handles: Vec<_> = ["a.mp3", "b.mp3"]
            .into_iter()
            .map(|clip| {
                let service = service.clone();
                thread::spawn(move || service.play_clip(clip))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(service.sink().max_concurrent_writers(), 1);
        assert_eq!(
            *states.lock(),
            vec![
                VoiceState::Loading,
                VoiceState::Playing,
                VoiceState::Idle,
                VoiceState::Loading,
                VoiceState::Playing,
                VoiceState::Idle,
            ]
        );
        assert_eq!(service.sink().samples().len(), 800);
    }
}
