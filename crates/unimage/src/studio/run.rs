//! Analysis runs: the multi-stage image pipeline and the video director.

use std::time::Duration;

use tracing::{info, warn};

use crate::agents::{AgentRole, FUSION_ORDER, PIPELINE_ORDER, VIDEO_DIRECTOR_INSTRUCTION};
use crate::broadcast::NoticeLevel;
use crate::pipeline::{
    estimate_from_length, estimate_video, PipelineContext, ProgressEstimator, StageEvent,
    StageReporter,
};

use super::state::{ActiveView, StageResult, StudioMode, StudioState};
use super::{RunLatch, Studio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAsset,
    AlreadyRunning,
    CredentialRequired,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoAsset => write!(f, "no asset loaded"),
            SkipReason::AlreadyRunning => write!(f, "an analysis is already running"),
            SkipReason::CredentialRequired => write!(f, "an API key is required"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { role: AgentRole, message: String },
    Skipped(SkipReason),
}

/// How a run is set up; the image pipeline and the video director differ
/// only in these values.
struct RunPlan {
    stages: Vec<AgentRole>,
    estimator: ProgressEstimator,
    fusion: bool,
    terminal: AgentRole,
    history_source: &'static str,
    instruction_override: Option<(AgentRole, &'static str)>,
    completion_delay_ms: u64,
    success_message: &'static str,
    failure_message: &'static str,
}

/// Routes runner events into the tracker and the studio state.
struct StudioReporter<'a> {
    studio: &'a Studio,
    generation: u64,
    task: u64,
    terminal: AgentRole,
    history_source: &'static str,
}

impl StudioReporter<'_> {
    fn is_cancelled(&self) -> bool {
        self.studio.current_generation() != self.generation
    }

    /// Applies `f` to the state unless another task was loaded since the run
    /// started.
    fn update_task(&self, f: impl FnOnce(&mut StudioState)) {
        self.studio.update(|state| {
            if self.studio.current_task() == self.task {
                f(state);
            }
        });
    }
}

impl StageReporter for StudioReporter<'_> {
    fn report(&self, event: StageEvent<'_>) {
        let studio = self.studio;
        match event {
            StageEvent::Started { index, role } => {
                studio.track(|t| t.start_step(index));
                // A cancelled run keeps streaming but no longer drives the view
                let follow_view = role != AgentRole::Synthesizer && !self.is_cancelled();
                self.update_task(|state| {
                    state.results.insert(
                        role,
                        StageResult::Streaming {
                            content: String::new(),
                        },
                    );
                    if follow_view {
                        state.active_view = ActiveView::Stage(role);
                    }
                });
                if follow_view {
                    studio.emit_view();
                }
            }
            StageEvent::Content {
                index,
                role,
                content,
            } => {
                studio.track(|t| t.update_step_content(index, content));
                self.update_task(|state| {
                    state.results.insert(
                        role,
                        StageResult::Streaming {
                            content: content.to_string(),
                        },
                    );
                });
            }
            StageEvent::Completed {
                index,
                role,
                content,
            } => {
                studio.track(|t| t.complete_step(index, content));
                // The prompt of a cancelled run is never applied
                let terminal = role == self.terminal && !self.is_cancelled();
                if role == self.terminal && !terminal {
                    info!(role = %role, "Run was cancelled, final prompt not applied");
                }
                self.update_task(|state| {
                    state.results.insert(
                        role,
                        StageResult::Complete {
                            content: content.to_string(),
                        },
                    );
                    if terminal {
                        state.editable_prompt = content.to_string();
                        state.prompt_history.push(content, self.history_source);
                    }
                });
            }
            StageEvent::Failed { index, role, error } => {
                studio.track(|t| t.error_step(index, error));
                self.update_task(|state| {
                    let content = state.result(role).content().to_string();
                    state.results.insert(
                        role,
                        StageResult::Failed {
                            content,
                            error: error.to_string(),
                        },
                    );
                });
            }
        }
    }
}

impl Studio {
    /// Runs the analysis matching the current mode.
    pub async fn run_analysis(&self) -> RunOutcome {
        let mode = self.lock_state().mode;
        match mode {
            StudioMode::Video => self.video_director_analysis().await,
            StudioMode::Replicate | StudioMode::Fusion => self.process_image_pipeline().await,
        }
    }

    /// Four-stage analysis of the loaded image; fusion mode reorders the
    /// stages and feeds the product image to the Descriptor and Synthesizer.
    pub async fn process_image_pipeline(&self) -> RunOutcome {
        let fusion = self.lock_state().mode == StudioMode::Fusion;
        let plan = RunPlan {
            stages: if fusion {
                FUSION_ORDER.to_vec()
            } else {
                PIPELINE_ORDER.to_vec()
            },
            estimator: estimate_from_length,
            fusion,
            terminal: AgentRole::Synthesizer,
            history_source: "Pipeline",
            instruction_override: None,
            completion_delay_ms: self.config().pipeline.completion_delay_ms,
            success_message: "Prompt generation complete",
            failure_message: "Pipeline error",
        };
        self.run_plan(plan).await
    }

    /// Single-stage video prompt analysis of the loaded asset.
    pub async fn video_director_analysis(&self) -> RunOutcome {
        let plan = RunPlan {
            stages: vec![AgentRole::SoraVideographer],
            estimator: estimate_video,
            fusion: false,
            terminal: AgentRole::SoraVideographer,
            history_source: "Video Director",
            instruction_override: Some((AgentRole::SoraVideographer, VIDEO_DIRECTOR_INSTRUCTION)),
            completion_delay_ms: self.config().pipeline.video_completion_delay_ms,
            success_message: "Video prompt generation complete",
            failure_message: "Video analysis failed",
        };
        self.run_plan(plan).await
    }

    async fn run_plan(&self, plan: RunPlan) -> RunOutcome {
        let (source, product) = {
            let state = self.lock_state();
            (state.source.clone(), state.product.clone())
        };
        let Some(source) = source else {
            return RunOutcome::Skipped(SkipReason::NoAsset);
        };
        if !self.require_credentials() {
            return RunOutcome::Skipped(SkipReason::CredentialRequired);
        }
        let Some(_latch) = RunLatch::acquire(&self.inner.running) else {
            info!("Analysis already running, ignoring request");
            return RunOutcome::Skipped(SkipReason::AlreadyRunning);
        };
        let generation = self.next_generation();
        let task = self.current_task();

        self.update(|state| {
            state.is_processing = true;
            state.progress_visible = true;
            state.active_view = ActiveView::Studio;
        });
        self.track(|t| {
            t.init_pipeline_with(&plan.stages, plan.estimator);
            Ok(())
        });
        self.emit_view();

        let mut ctx = PipelineContext::new(source, plan.stages.clone())
            .with_product(if plan.fusion { product } else { None });
        if let Some((role, instruction)) = plan.instruction_override {
            ctx.instructions.insert(role, instruction.to_string());
        }
        match self.inner.prompts.resolve_all(&plan.stages) {
            Ok(overrides) => ctx.instructions.extend(overrides),
            Err(e) => warn!(error = %e, "Prompt library unavailable, using built-in instructions"),
        }

        let reporter = StudioReporter {
            studio: self,
            generation,
            task,
            terminal: plan.terminal,
            history_source: plan.history_source,
        };
        let outcome = match self.inner.runner.run(&mut ctx, &reporter).await {
            Ok(()) => {
                self.track(|t| t.complete_pipeline());
                self.finish_run(generation, plan.completion_delay_ms, plan.success_message);
                RunOutcome::Completed
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, plan.failure_message);
                RunOutcome::Failed {
                    role: e.role(),
                    message: e.to_string(),
                }
            }
        };

        self.update(|state| state.is_processing = false);
        outcome
    }

    /// Hides the progress view after `delay_ms` and announces success,
    /// unless the run was cancelled or superseded in the meantime.
    fn finish_run(&self, generation: u64, delay_ms: u64, message: &'static str) {
        if delay_ms == 0 {
            self.complete_view(generation, message);
            return;
        }
        let studio = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            studio.complete_view(generation, message);
        });
    }

    fn complete_view(&self, generation: u64, message: &str) {
        if self.current_generation() != generation {
            info!("Run was cancelled, skipping completion notice");
            return;
        }
        self.update(|state| {
            state.progress_visible = false;
            state.active_view = ActiveView::Studio;
        });
        self.emit_view();
        self.notify(NoticeLevel::Success, message);
    }

    /// Discards visible progress and clears the processing flag. The request
    /// in flight is not aborted: its stage results still land while the same
    /// task is loaded, but its final prompt, progress updates and completion
    /// notice are dropped. The run keeps the latch until it finishes.
    pub fn cancel_pipeline(&self) {
        self.next_generation();
        self.lock_tracker().reset_pipeline();
        self.inner
            .events
            .send(crate::broadcast::StudioEvent::Progress { progress: None });
        self.update(|state| {
            state.is_processing = false;
            state.progress_visible = false;
            state.active_view = ActiveView::Studio;
        });
        self.emit_view();
        self.notify(NoticeLevel::Info, "Analysis cancelled");
    }
}
