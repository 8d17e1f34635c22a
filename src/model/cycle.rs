use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Started,
    Stopped,
    Aborted,
    Terminated,
    Excluded,
    Reported,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStatus::Started => "started",
            CycleStatus::Stopped => "stopped",
            CycleStatus::Aborted => "aborted",
            CycleStatus::Terminated => "terminated",
            CycleStatus::Excluded => "excluded",
            CycleStatus::Reported => "reported",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "started" => Some(CycleStatus::Started),
            "stopped" => Some(CycleStatus::Stopped),
            "aborted" => Some(CycleStatus::Aborted),
            "terminated" => Some(CycleStatus::Terminated),
            "excluded" => Some(CycleStatus::Excluded),
            "reported" => Some(CycleStatus::Reported),
            _ => None,
        }
    }

    /// Legal transitions of the per-cycle state machine. Terminal states
    /// (`terminated`, `reported`) are never implicitly revoked; `excluded`
    /// may be re-included back to `stopped`.
    pub fn can_transition(self, to: CycleStatus) -> bool {
        use CycleStatus::*;
        matches!(
            (self, to),
            (Started, Stopped)
                | (Started, Aborted)
                | (Started, Terminated)
                | (Stopped, Reported)
                | (Stopped, Excluded)
                | (Stopped, Terminated)
                | (Excluded, Stopped)
                | (Aborted, Terminated)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionCycle {
    pub id: i64,
    pub project_id: i64,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub threads_count: u32,
}

impl ExecutionCycle {
    pub fn duration_secs(&self) -> Option<i64> {
        self.stopped_at
            .map(|stopped| (stopped - self.started_at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::CycleStatus::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for target in [Started, Stopped, Aborted, Terminated, Excluded, Reported] {
            assert!(!Reported.can_transition(target));
            assert!(!Terminated.can_transition(target));
        }
    }

    #[test]
    fn exclude_and_include_are_inverse() {
        assert!(Stopped.can_transition(Excluded));
        assert!(Excluded.can_transition(Stopped));
        assert!(!Excluded.can_transition(Reported));
    }

    #[test]
    fn round_trip_status_labels() {
        for status in [Started, Stopped, Aborted, Terminated, Excluded, Reported] {
            assert_eq!(super::CycleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(super::CycleStatus::parse("bogus"), None);
    }
}
