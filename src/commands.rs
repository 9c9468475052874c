// Sound command routing
// Turns inbound feed messages into play requests

/// Payload that means "stay silent"
pub const SILENCE_PAYLOAD: &str = "0";

/// One inbound message, consumed as soon as it is routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub topic: String,
    pub payload: String,
}

impl CommandEvent {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub clip: String,
}

pub struct CommandRouter {
    topic: String,
}

impl CommandRouter {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Map an event to a play request.
    ///
    /// Events on other topics and the silence payload produce nothing. The payload
    /// is passed through verbatim as the clip name; whether it exists is for the
    /// playback service to decide.
    pub fn route(&self, event: &CommandEvent) -> Option<PlayRequest> {
        if event.topic != self.topic || event.payload == SILENCE_PAYLOAD {
            return None;
        }

        Some(PlayRequest {
            clip: event.payload.clone(),
        })
    }
}
