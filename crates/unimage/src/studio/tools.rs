//! Prompt tools around a loaded task: translation, refinement, layout
//! detection and quality checks.

use std::sync::LazyLock;

use futures_util::StreamExt;
use regex::Regex;
use tracing::{info, warn};

use crate::agents::AgentRole;
use crate::broadcast::NoticeLevel;
use crate::client::{GenerationConfig, GenerationRequest, Part};
use crate::error::Result;
use crate::layout::{parse_layout_response, LayoutElement, LAYOUT_PROMPT};

use super::state::Language;
use super::Studio;

const REFINE_INSTRUCTION: &str = "You are an expert prompt engineer. Refine the prompt based on the user feedback or analysis. Output ONLY the refined prompt text.";

const QUALITY_CHECK_PROMPT: &str = "Compare these two images. First is original, second is generated. Provide a quality check report and 3 specific suggestions for improvement.";

/// Maximum number of suggestions taken from a quality report.
const MAX_SUGGESTIONS: usize = 3;

static RE_LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.|^[*-]").unwrap());
static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\.|[*-])\s*").unwrap());

/// Numbered or bulleted lines of a report, markers stripped.
pub fn extract_suggestions(report: &str) -> Vec<String> {
    report
        .lines()
        .filter(|line| RE_LIST_ITEM.is_match(line))
        .map(|line| RE_LIST_MARKER.replace(line, "").trim().to_string())
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn translation_prompt(text: &str, target: Language) -> String {
    match target {
        Language::Cn => format!(
            "Translate the following prompt to Chinese (Professional/Technical style): {}",
            text
        ),
        Language::En => format!(
            "Translate the following to English (Midjourney prompt style): {}",
            text
        ),
    }
}

impl Studio {
    /// Switches the editable prompt between Chinese and English, translating
    /// on first use and serving later switches from the prompt cache.
    pub async fn toggle_language(&self) -> Result<Language> {
        let (current, prompt, cached) = {
            let state = self.lock_state();
            let target = state.language.toggled();
            (
                state.language,
                state.editable_prompt.clone(),
                state.prompt_cache.get(target).map(str::to_string),
            )
        };
        let target = current.toggled();

        if let Some(cached) = cached {
            self.update(|state| {
                state.prompt_cache.set(current, prompt);
                state.editable_prompt = cached;
                state.language = target;
            });
            return Ok(target);
        }
        if prompt.trim().is_empty() || !self.require_credentials() {
            return Ok(current);
        }

        self.notify(
            NoticeLevel::Info,
            match target {
                Language::En => "Switching to English prompt mode...",
                Language::Cn => "Switching to Chinese prompt mode...",
            },
        );
        let request = GenerationRequest::new(
            self.config().models.fast.clone(),
            vec![Part::text(translation_prompt(&prompt, target))],
        );
        let translated = match self.inner.client.generate(request).await {
            Ok(response) => response.text().unwrap_or_else(|| prompt.clone()),
            Err(e) => {
                self.notify(NoticeLevel::Error, "Translation failed");
                return Err(e.into());
            }
        };

        let source = match target {
            Language::En => "English translation",
            Language::Cn => "Chinese translation",
        };
        self.update(|state| {
            if state.prompt_cache.get(current).is_none() {
                state.prompt_cache.set(current, prompt);
            }
            state.prompt_cache.set(target, translated.clone());
            state.prompt_history.push(&translated, source);
            state.editable_prompt = translated;
            state.language = target;
        });
        Ok(target)
    }

    /// Rewrites the editable prompt according to `feedback`.
    pub async fn refine_prompt(&self, feedback: &str) -> Result<Option<String>> {
        let (prompt, reference) = {
            let mut state = self.lock_state();
            if state.is_refining_prompt {
                return Ok(None);
            }
            state.is_refining_prompt = true;
            let reference = if state.use_reference_image {
                state.source.clone()
            } else {
                None
            };
            (state.editable_prompt.clone(), reference)
        };

        let result = if self.require_credentials() {
            let mut parts = Vec::new();
            if let Some(reference) = &reference {
                parts.push(reference.to_part());
            }
            parts.push(Part::text(format!(
                "Original Prompt: {}\n\nFeedback/Request: {}\n\nRefined Prompt:",
                prompt, feedback
            )));
            let request = GenerationRequest::new(self.config().models.fast.clone(), parts)
                .with_system_instruction(REFINE_INSTRUCTION);
            self.inner
                .client
                .generate(request)
                .await
                .map(|response| Some(response.text().unwrap_or_else(|| prompt.clone())))
        } else {
            Ok(None)
        };

        let refined = self.update(|state| {
            state.is_refining_prompt = false;
            if let Ok(Some(refined)) = &result {
                state.editable_prompt = refined.clone();
                state.prompt_history.push(refined, "Refine");
            }
            result
        });
        if refined.is_err() {
            self.notify(NoticeLevel::Error, "Prompt refinement failed");
        }
        Ok(refined?)
    }

    /// Detects layout elements of the source image. An unparseable reply
    /// yields an empty list.
    pub async fn detect_layout(&self) -> Result<Vec<LayoutElement>> {
        let source = {
            let mut state = self.lock_state();
            if state.is_analyzing_layout {
                return Ok(Vec::new());
            }
            let Some(source) = state.source.clone() else {
                return Ok(Vec::new());
            };
            state.is_analyzing_layout = true;
            source
        };

        let result = if self.require_credentials() {
            let request = GenerationRequest::new(
                self.config().models.reasoning.clone(),
                vec![source.to_part(), Part::text(LAYOUT_PROMPT)],
            )
            .with_config(GenerationConfig::json());
            self.inner
                .client
                .generate(request)
                .await
                .map(|response| parse_layout_response(&response.text().unwrap_or_default()))
        } else {
            Ok(Vec::new())
        };

        let result = self.update(|state| {
            state.is_analyzing_layout = false;
            if let Ok(elements) = &result {
                state.layout = Some(elements.clone());
            }
            result
        });
        match result {
            Ok(elements) => {
                info!(count = elements.len(), "Layout detected");
                Ok(elements)
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, "Layout detection failed");
                Err(e.into())
            }
        }
    }

    /// Streams a Critic review of the generated image against the source
    /// and stores up to three improvement suggestions.
    pub async fn quality_check(&self) -> Result<Option<String>> {
        let (source, generated) = {
            let mut state = self.lock_state();
            let (Some(source), Some(generated)) =
                (state.source.clone(), state.generated_image.clone())
            else {
                return Ok(None);
            };
            if state.is_checking_quality {
                return Ok(None);
            }
            state.is_checking_quality = true;
            (source, generated)
        };

        let result = if self.require_credentials() {
            self.stream_critic(&source.to_part(), &generated).await.map(Some)
        } else {
            Ok(None)
        };

        let result = self.update(|state| {
            state.is_checking_quality = false;
            if let Ok(Some(report)) = &result {
                state.suggestions = extract_suggestions(report);
                state.results.insert(
                    AgentRole::Critic,
                    super::StageResult::Complete {
                        content: report.clone(),
                    },
                );
            }
            result
        });
        if let Err(e) = &result {
            warn!(error = %e, "Quality check failed");
            self.notify(NoticeLevel::Error, "Quality check failed");
        }
        Ok(result?)
    }

    async fn stream_critic(
        &self,
        source: &Part,
        generated: &str,
    ) -> std::result::Result<String, crate::client::ClientError> {
        let request = GenerationRequest::new(
            self.config().models.reasoning.clone(),
            vec![
                source.clone(),
                Part::inline("image/png", generated),
                Part::text(QUALITY_CHECK_PROMPT),
            ],
        )
        .with_system_instruction(AgentRole::Critic.profile().system_instruction);

        let mut stream = self.inner.client.stream(request).await?;
        let mut report = String::new();
        while let Some(chunk) = stream.next().await {
            report.push_str(&chunk?);
            let content = report.clone();
            self.update(|state| {
                state.results.insert(
                    AgentRole::Critic,
                    super::StageResult::Streaming { content },
                );
            });
        }
        Ok(report)
    }
}
