use serde::Serialize;

/// Lifecycle of one generation panel. Only the owner of the panel moves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PanelState {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Error(String),
}

impl PanelState {
    /// A panel is busy while a call it issued is still outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self, PanelState::Requesting | PanelState::Streaming)
    }

    /// Idle -> Requesting/Streaming. Returns false (and leaves the state alone) when busy.
    pub fn begin(&mut self, streaming: bool) -> bool {
        if self.is_busy() {
            return false;
        }
        *self = if streaming {
            PanelState::Streaming
        } else {
            PanelState::Requesting
        };
        true
    }

    pub fn finish(&mut self) {
        *self = PanelState::Idle;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        *self = PanelState::Error(message.into());
    }
}
