use std::fmt;

/// Lifecycle of the capture loop as seen by callers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// No run has started yet.
    #[default]
    Idle,
    Running,
    /// A file source reached its end.
    Finished,
    /// `stop` ended the run.
    Stopped,
    /// The source faulted; the message is the capture error.
    Errored(String),
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }

    /// True once a run has ended, whatever the reason.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Finished | RunStatus::Stopped | RunStatus::Errored(_)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Finished => write!(f, "finished"),
            RunStatus::Stopped => write!(f, "stopped"),
            RunStatus::Errored(msg) => write!(f, "errored: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RunStatus::Idle, false)]
    #[case(RunStatus::Running, false)]
    #[case(RunStatus::Finished, true)]
    #[case(RunStatus::Stopped, true)]
    #[case(RunStatus::Errored("unplugged".into()), true)]
    fn test_terminal_states(#[case] status: RunStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn test_display_includes_error_message() {
        assert_eq!(
            RunStatus::Errored("device lost".into()).to_string(),
            "errored: device lost"
        );
        assert_eq!(RunStatus::default().to_string(), "idle");
    }
}
