use std::fmt;

/// Phases the client moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Intro,
    Acquiring,
    Reported,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Acquiring => "acquiring",
            Phase::Reported => "reported",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the client is shutting down
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}
