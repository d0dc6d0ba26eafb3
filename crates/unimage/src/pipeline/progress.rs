use crate::agents::AgentRole;

/// Events emitted by the runner while it works through the stages.
#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    Started {
        index: usize,
        role: AgentRole,
    },
    /// Accumulated content so far, in arrival order.
    Content {
        index: usize,
        role: AgentRole,
        content: &'a str,
    },
    Completed {
        index: usize,
        role: AgentRole,
        content: &'a str,
    },
    Failed {
        index: usize,
        role: AgentRole,
        error: &'a str,
    },
}

impl StageEvent<'_> {
    pub fn index(&self) -> usize {
        match self {
            StageEvent::Started { index, .. }
            | StageEvent::Content { index, .. }
            | StageEvent::Completed { index, .. }
            | StageEvent::Failed { index, .. } => *index,
        }
    }
}

pub trait StageReporter: Send + Sync {
    fn report(&self, event: StageEvent<'_>);
}

/// No-op reporter for unit tests.
pub struct NoopReporter;

impl StageReporter for NoopReporter {
    fn report(&self, _event: StageEvent<'_>) {}
}
