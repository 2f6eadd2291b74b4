use std::fmt;

/// Phase of a single run.
///
/// `Idle → NsfwGate → {ImageFlow | VideoFlow} → Done`, with `Aborted`
/// reachable from every non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    NsfwGate,
    ImageFlow,
    VideoFlow,
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, NsfwGate) => true,
            (NsfwGate, ImageFlow | VideoFlow) => true,
            (ImageFlow | VideoFlow, Done) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::NsfwGate => "nsfw gate",
            RunState::ImageFlow => "image flow",
            RunState::VideoFlow => "video flow",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
