//! Per-step and aggregate progress of an analysis run, owned by the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::AgentRole;

/// Maps streamed content to a step progress percentage (0-100).
pub type ProgressEstimator = fn(&str) -> u8;

/// Default heuristic: one percent per five characters, capped at 95 until
/// the step completes.
pub fn estimate_from_length(content: &str) -> u8 {
    (content.chars().count() / 5).min(95) as u8
}

/// Video director heuristic: one percent per ten characters, capped at 98.
pub fn estimate_video(content: &str) -> u8 {
    (content.chars().count() / 10).min(98) as u8
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub name: String,
    pub role: AgentRole,
    pub status: StepStatus,
    /// Heuristic percentage, 100 once completed.
    pub progress: u8,
    pub description: String,
    pub streaming_content: String,
    pub final_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl PipelineStep {
    fn pending(role: AgentRole) -> Self {
        let profile = role.profile();
        Self {
            name: profile.name.to_string(),
            role,
            status: StepStatus::Pending,
            progress: 0,
            description: profile.description.to_string(),
            streaming_content: String::new(),
            final_content: String::new(),
            error: None,
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineProgress {
    pub is_running: bool,
    pub total_progress: u8,
    /// Execution order.
    pub steps: Vec<PipelineStep>,
    #[serde(default)]
    pub current_step_index: Option<usize>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_ms: Option<u64>,
}

impl PipelineProgress {
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn current_step(&self) -> Option<&PipelineStep> {
        self.current_step_index.and_then(|i| self.steps.get(i))
    }

    fn total_with_fraction(&self, fraction: u8) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        // floor(((completed + fraction / 100) / len) * 100) in integer arithmetic
        let scaled = self.completed_steps() * 100 + usize::from(fraction);
        (scaled / self.steps.len()).min(100) as u8
    }

    fn update_eta(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.start_time).num_milliseconds().max(0) as u64;
        self.estimated_time_remaining_ms = match self.total_progress {
            0 => None,
            p if p >= 100 => Some(0),
            p => Some(elapsed * u64::from(100 - p) / u64::from(p)),
        };
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrackerError {
    #[error("No pipeline run is active")]
    NoActiveRun,

    #[error("Step index {index} out of range for {len} steps")]
    StepOutOfRange { index: usize, len: usize },
}

/// Owns the visible progress of the current run. `None` means no run is
/// shown; every mutation then fails with [`TrackerError::NoActiveRun`].
#[derive(Debug)]
pub struct PipelineTracker {
    progress: Option<PipelineProgress>,
    estimator: ProgressEstimator,
}

impl Default for PipelineTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self {
            progress: None,
            estimator: estimate_from_length,
        }
    }

    pub fn progress(&self) -> Option<&PipelineProgress> {
        self.progress.as_ref()
    }

    /// Owned copy of the current progress, for broadcasting.
    pub fn snapshot(&self) -> Option<PipelineProgress> {
        self.progress.clone()
    }

    pub fn init_pipeline(&mut self, stages: &[AgentRole]) {
        self.init_pipeline_with(stages, estimate_from_length);
    }

    pub fn init_pipeline_with(&mut self, stages: &[AgentRole], estimator: ProgressEstimator) {
        self.estimator = estimator;
        self.progress = Some(PipelineProgress {
            is_running: true,
            total_progress: 0,
            steps: stages.iter().copied().map(PipelineStep::pending).collect(),
            current_step_index: None,
            start_time: Utc::now(),
            estimated_time_remaining_ms: None,
        });
    }

    fn step_mut(&mut self, index: usize) -> Result<&mut PipelineProgress, TrackerError> {
        let progress = self.progress.as_mut().ok_or(TrackerError::NoActiveRun)?;
        if index >= progress.steps.len() {
            return Err(TrackerError::StepOutOfRange {
                index,
                len: progress.steps.len(),
            });
        }
        Ok(progress)
    }

    pub fn start_step(&mut self, index: usize) -> Result<(), TrackerError> {
        let progress = self.step_mut(index)?;
        let step = &mut progress.steps[index];
        step.status = StepStatus::Running;
        step.start_time = Some(Utc::now());
        step.progress = 0;
        progress.current_step_index = Some(index);
        Ok(())
    }

    pub fn update_step_content(&mut self, index: usize, content: &str) -> Result<(), TrackerError> {
        let estimate = self.estimator;
        let progress = self.step_mut(index)?;
        let fraction = estimate(content).min(100);
        let step = &mut progress.steps[index];
        step.streaming_content = content.to_string();
        step.progress = fraction;
        progress.total_progress = progress.total_with_fraction(fraction);
        progress.update_eta(Utc::now());
        Ok(())
    }

    pub fn complete_step(&mut self, index: usize, content: &str) -> Result<(), TrackerError> {
        let progress = self.step_mut(index)?;
        let step = &mut progress.steps[index];
        step.status = StepStatus::Completed;
        step.streaming_content = content.to_string();
        step.final_content = content.to_string();
        step.progress = 100;
        step.end_time = Some(Utc::now());
        progress.total_progress = progress.total_with_fraction(0);
        progress.update_eta(Utc::now());
        Ok(())
    }

    pub fn error_step(&mut self, index: usize, message: &str) -> Result<(), TrackerError> {
        let progress = self.step_mut(index)?;
        let step = &mut progress.steps[index];
        step.status = StepStatus::Error;
        step.error = Some(message.to_string());
        step.end_time = Some(Utc::now());
        progress.is_running = false;
        progress.estimated_time_remaining_ms = None;
        Ok(())
    }

    pub fn complete_pipeline(&mut self) -> Result<(), TrackerError> {
        let progress = self.progress.as_mut().ok_or(TrackerError::NoActiveRun)?;
        progress.is_running = false;
        progress.total_progress = 100;
        progress.estimated_time_remaining_ms = Some(0);
        Ok(())
    }

    pub fn reset_pipeline(&mut self) {
        self.progress = None;
        self.estimator = estimate_from_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::PIPELINE_ORDER;

    fn running_tracker() -> PipelineTracker {
        let mut tracker = PipelineTracker::new();
        tracker.init_pipeline(&PIPELINE_ORDER);
        tracker
    }

    #[test]
    fn test_estimators() {
        assert_eq!(estimate_from_length(""), 0);
        assert_eq!(estimate_from_length(&"a".repeat(50)), 10);
        assert_eq!(estimate_from_length(&"a".repeat(10_000)), 95);
        assert_eq!(estimate_video(&"a".repeat(50)), 5);
        assert_eq!(estimate_video(&"a".repeat(10_000)), 98);
        // Counted in characters, not bytes
        assert_eq!(estimate_from_length(&"光".repeat(10)), 2);
    }

    #[test]
    fn test_init_creates_pending_steps() {
        let tracker = running_tracker();
        let progress = tracker.progress().unwrap();
        assert!(progress.is_running);
        assert_eq!(progress.total_progress, 0);
        assert_eq!(progress.current_step_index, None);
        assert_eq!(progress.steps.len(), 4);
        assert!(progress
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Pending && s.progress == 0));
        let roles: Vec<_> = progress.steps.iter().map(|s| s.role).collect();
        assert_eq!(roles, PIPELINE_ORDER.to_vec());
    }

    #[test]
    fn test_update_then_complete_leaves_final_content() {
        let mut tracker = running_tracker();
        tracker.start_step(0).unwrap();
        tracker.update_step_content(0, "partial").unwrap();
        tracker.complete_step(0, "final text").unwrap();

        let step = &tracker.progress().unwrap().steps[0];
        assert_eq!(step.final_content, "final text");
        assert_eq!(step.progress, 100);
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.end_time.is_some());
        assert_eq!(tracker.progress().unwrap().total_progress, 25);
    }

    #[test]
    fn test_total_progress_formula() {
        let mut tracker = running_tracker();
        tracker.start_step(0).unwrap();
        tracker.complete_step(0, "done").unwrap();
        tracker.start_step(1).unwrap();
        // 250 chars -> 50% of the second step -> (1 + 0.5) / 4 = 37.5%
        tracker.update_step_content(1, &"x".repeat(250)).unwrap();
        let progress = tracker.progress().unwrap();
        assert_eq!(progress.steps[1].progress, 50);
        assert_eq!(progress.total_progress, 37);
        assert_eq!(progress.current_step_index, Some(1));
    }

    #[test]
    fn test_total_progress_non_decreasing() {
        let mut tracker = running_tracker();
        let mut last = 0;
        let mut content = String::new();
        for index in 0..4 {
            tracker.start_step(index).unwrap();
            for _ in 0..40 {
                content.push_str("0123456789");
                tracker.update_step_content(index, &content).unwrap();
                let total = tracker.progress().unwrap().total_progress;
                assert!(total >= last, "{} < {}", total, last);
                last = total;
            }
            tracker.complete_step(index, &content).unwrap();
            let total = tracker.progress().unwrap().total_progress;
            assert!(total >= last);
            last = total;
            content.clear();
        }
        tracker.complete_pipeline().unwrap();
        assert_eq!(tracker.progress().unwrap().total_progress, 100);
    }

    #[test]
    fn test_error_halts_run() {
        let mut tracker = running_tracker();
        tracker.start_step(0).unwrap();
        tracker.error_step(0, "network down").unwrap();
        let progress = tracker.progress().unwrap();
        assert!(!progress.is_running);
        assert_eq!(progress.steps[0].status, StepStatus::Error);
        assert_eq!(progress.steps[0].error.as_deref(), Some("network down"));
        assert_eq!(progress.steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn test_reset_then_init_is_fresh() {
        let mut tracker = running_tracker();
        tracker.start_step(0).unwrap();
        tracker.update_step_content(0, "some content").unwrap();
        tracker.reset_pipeline();
        assert!(tracker.progress().is_none());

        tracker.init_pipeline(&PIPELINE_ORDER);
        let progress = tracker.progress().unwrap();
        assert_eq!(progress.total_progress, 0);
        assert!(progress.steps.iter().all(|s| s.status == StepStatus::Pending
            && s.streaming_content.is_empty()
            && s.final_content.is_empty()));
    }

    #[test]
    fn test_mutations_after_reset_are_rejected() {
        let mut tracker = running_tracker();
        tracker.reset_pipeline();
        assert_eq!(tracker.start_step(0), Err(TrackerError::NoActiveRun));
        assert_eq!(
            tracker.update_step_content(0, "late"),
            Err(TrackerError::NoActiveRun)
        );
        assert_eq!(tracker.complete_step(0, "late"), Err(TrackerError::NoActiveRun));
        assert_eq!(tracker.complete_pipeline(), Err(TrackerError::NoActiveRun));
        assert!(tracker.progress().is_none());
    }

    #[test]
    fn test_step_out_of_range() {
        let mut tracker = running_tracker();
        assert_eq!(
            tracker.start_step(4),
            Err(TrackerError::StepOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn test_video_estimator_single_step() {
        let mut tracker = PipelineTracker::new();
        tracker.init_pipeline_with(&[AgentRole::SoraVideographer], estimate_video);
        tracker.start_step(0).unwrap();
        tracker.update_step_content(0, &"v".repeat(300)).unwrap();
        assert_eq!(tracker.progress().unwrap().total_progress, 30);

        // Reset restores the default estimator
        tracker.reset_pipeline();
        tracker.init_pipeline(&[AgentRole::Auditor]);
        tracker.start_step(0).unwrap();
        tracker.update_step_content(0, &"v".repeat(300)).unwrap();
        assert_eq!(tracker.progress().unwrap().total_progress, 60);
    }

    #[test]
    fn test_eta_reported_once_progress_known() {
        let mut tracker = running_tracker();
        tracker.start_step(0).unwrap();
        tracker.update_step_content(0, &"x".repeat(100)).unwrap();
        assert!(tracker
            .progress()
            .unwrap()
            .estimated_time_remaining_ms
            .is_some());
    }
}
