use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agents::AgentRole;
use crate::client::{ClientError, GenerationClient, GenerationRequest, Part};

use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{StageEvent, StageReporter};

/// Runs the analysis stages of a [`PipelineContext`] strictly in order,
/// streaming each stage and feeding its output into the next.
pub struct PipelineRunner {
    client: Arc<dyn GenerationClient>,
    model: String,
}

impl PipelineRunner {
    pub fn new(client: Arc<dyn GenerationClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs every stage. Stops at the first failing stage; outputs of the
    /// stages before it stay in `ctx`.
    pub async fn run(
        &self,
        ctx: &mut PipelineContext,
        reporter: &dyn StageReporter,
    ) -> Result<(), PipelineError> {
        let span = info_span!("pipeline",
            stages = ctx.stages.len(),
            fusion = ctx.product.is_some(),
            model = %self.model,
        );

        async {
            let stages = ctx.stages.clone();
            for (index, role) in stages.into_iter().enumerate() {
                self.run_stage(ctx, index, role, reporter)
                    .instrument(info_span!("stage", role = %role, index))
                    .await?;
            }
            info!("All stages completed");
            Ok::<(), PipelineError>(())
        }
        .instrument(span)
        .await
    }

    async fn run_stage(
        &self,
        ctx: &mut PipelineContext,
        index: usize,
        role: AgentRole,
        reporter: &dyn StageReporter,
    ) -> Result<(), PipelineError> {
        reporter.report(StageEvent::Started { index, role });

        match self.stream_stage(ctx, index, role, reporter).await {
            Ok(content) => {
                debug!(chars = content.chars().count(), "Stage completed");
                ctx.record(role, &content);
                reporter.report(StageEvent::Completed {
                    index,
                    role,
                    content: &content,
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Stage failed");
                let message = e.to_string();
                reporter.report(StageEvent::Failed {
                    index,
                    role,
                    error: &message,
                });
                Err(PipelineError::Stage { role, source: e })
            }
        }
    }

    async fn stream_stage(
        &self,
        ctx: &PipelineContext,
        index: usize,
        role: AgentRole,
        reporter: &dyn StageReporter,
    ) -> Result<String, ClientError> {
        let mut parts = ctx.inputs_for(role);
        parts.push(Part::text(ctx.prompt()));
        let request = GenerationRequest::new(self.model.clone(), parts)
            .with_system_instruction(ctx.instruction_for(role));

        let mut stream = self.client.stream(request).await?;
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            content.push_str(&chunk?);
            reporter.report(StageEvent::Content {
                index,
                role,
                content: &content,
            });
        }
        Ok(content)
    }
}
