// The single playback voice

/// Phase of the voice while a clip moves through it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Loading,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackVoice {
    pub state: VoiceState,
    pub level: f32,
    pub source: Option<String>,
}

impl PlaybackVoice {
    pub fn new(level: f32) -> Self {
        Self {
            state: VoiceState::Idle,
            level: level.clamp(0.0, 1.0),
            source: None,
        }
    }

    pub fn active(&self) -> bool {
        self.state != VoiceState::Idle
    }

    /// Claim the voice for a clip
    pub(crate) fn load(&mut self, clip: &str) {
        self.state = VoiceState::Loading;
        self.source = Some(clip.to_string());
    }

    pub(crate) fn start(&mut self, level: f32) {
        self.state = VoiceState::Playing;
        self.level = level.clamp(0.0, 1.0);
    }

    pub(crate) fn release(&mut self) {
        self.state = VoiceState::Idle;
        self.source = None;
    }
}
