//! Assistant chat: routes a free-form message to a prompt skill by intent
//! and falls back to plain conversation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::broadcast::NoticeLevel;
use crate::client::{GenerationRequest, Part};
use crate::error::Result;

use super::tools::extract_suggestions;
use super::Studio;

const REVERSE_PROMPT: &str =
    "Perform a quick reverse engineering of this image to generate a high-quality prompt.";

const SMART_ANALYSIS_INSTRUCTION: &str = "You are an AI assistant helping a user optimize their image generation workflow. \
The user has provided the original reference image, the generated image, and the prompt used. \
Analyze the difference and suggest what command the user should run next. \
Short, concise suggestion.";

const SMART_ANALYSIS_FALLBACK: &str = "Try refining the prompt.";
const EMPTY_REPLY: &str = "I didn't get a response.";
const ERROR_REPLY: &str = "Sorry, I encountered an error processing your request.";
const REFINE_REPLY: &str = "Here is a suggestion based on your request:";

/// What a chat message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillIntent {
    QualityCheck,
    Reverse,
    Refine,
    Translate,
    Generate,
    Chat,
}

impl SkillIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillIntent::QualityCheck => "quality-check",
            SkillIntent::Reverse => "reverse",
            SkillIntent::Refine => "refine",
            SkillIntent::Translate => "translate",
            SkillIntent::Generate => "generate",
            SkillIntent::Chat => "chat",
        }
    }
}

impl std::fmt::Display for SkillIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword routing, first match wins. Chinese and English keywords are
/// both recognised.
pub fn detect_intent(message: &str) -> SkillIntent {
    let m = message.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| m.contains(k));
    if has(&["质检", "check", "audit"]) {
        SkillIntent::QualityCheck
    } else if has(&["逆向", "reverse"]) {
        SkillIntent::Reverse
    } else if has(&["修", "改", "refine"]) {
        SkillIntent::Refine
    } else if has(&["翻译", "translate"]) {
        SkillIntent::Translate
    } else if has(&["生成", "generate"]) {
        SkillIntent::Generate
    } else {
        SkillIntent::Chat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatRole {
    User,
    Assistant,
    SkillResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillIntent>,
    /// Prompt candidates a skill result offers to apply.
    pub suggestions: Vec<String>,
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            skill: None,
            suggestions: Vec::new(),
            applied: false,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn skill_result(
        skill: SkillIntent,
        content: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            skill: Some(skill),
            suggestions,
            ..Self::new(ChatRole::SkillResult, content)
        }
    }
}

impl Studio {
    /// Sends `message` to the assistant. Quality check, reverse and refine
    /// requests run the matching skill when the task has what it needs;
    /// everything else is answered as plain chat. Returns the reply, or
    /// `None` when the message was empty or another message is in flight.
    pub async fn send_chat_message(&self, message: &str) -> Result<Option<ChatMessage>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(None);
        }
        {
            let mut state = self.lock_state();
            if state.is_chatting {
                return Ok(None);
            }
            state.is_chatting = true;
        }
        if !self.require_credentials() {
            self.update(|state| state.is_chatting = false);
            return Ok(None);
        }
        self.update(|state| state.chat.push(ChatMessage::user(message)));

        let intent = detect_intent(message);
        info!(intent = %intent, "Chat message routed");
        let reply = match self.answer(intent, message).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, intent = %intent, "Chat request failed");
                ChatMessage::assistant(ERROR_REPLY)
            }
        };

        self.update(|state| {
            state.chat.push(reply.clone());
            state.is_chatting = false;
        });
        Ok(Some(reply))
    }

    async fn answer(&self, intent: SkillIntent, message: &str) -> Result<ChatMessage> {
        let (has_source, has_generated, prompt) = {
            let state = self.lock_state();
            (
                state.source.is_some(),
                state.generated_image.is_some(),
                state.editable_prompt.clone(),
            )
        };

        match intent {
            SkillIntent::QualityCheck if has_source && has_generated => {
                if let Some(report) = self.quality_check().await? {
                    let suggestions = extract_suggestions(&report);
                    return Ok(ChatMessage::skill_result(intent, report, suggestions));
                }
            }
            SkillIntent::Reverse if has_source => {
                if let Some(reversed) = self.reverse_prompt().await? {
                    return Ok(ChatMessage::skill_result(
                        intent,
                        reversed.clone(),
                        vec![reversed],
                    ));
                }
            }
            SkillIntent::Refine if !prompt.trim().is_empty() => {
                let refined = self.suggest_refinement(&prompt, message).await?;
                return Ok(ChatMessage::skill_result(intent, REFINE_REPLY, vec![refined]));
            }
            _ => {}
        }
        self.plain_chat(message).await
    }

    async fn plain_chat(&self, message: &str) -> Result<ChatMessage> {
        let request = GenerationRequest::new(
            self.config().models.fast.clone(),
            vec![Part::text(message)],
        );
        let response = self.inner.client.generate(request).await?;
        Ok(ChatMessage::assistant(
            response.text().unwrap_or_else(|| EMPTY_REPLY.to_string()),
        ))
    }

    /// A refined prompt for `instruction`, offered without touching the
    /// editable prompt.
    async fn suggest_refinement(&self, prompt: &str, instruction: &str) -> Result<String> {
        let source = self.lock_state().source.clone();
        let mut parts = Vec::new();
        if let Some(source) = &source {
            parts.push(source.to_part());
        }
        parts.push(Part::text(format!(
            "Current Prompt: {}\nInstruction: {}\nRefined Prompt:",
            prompt, instruction
        )));
        let request = GenerationRequest::new(self.config().models.fast.clone(), parts);
        let response = self.inner.client.generate(request).await?;
        Ok(response.text().unwrap_or_else(|| prompt.to_string()))
    }

    /// Replaces the editable prompt with suggestion `suggestion` of chat
    /// message `message`. Returns `false` when either index is out of range.
    pub fn apply_chat_suggestion(&self, message: usize, suggestion: usize) -> bool {
        self.update(|state| {
            let Some(text) = state
                .chat
                .get(message)
                .and_then(|m| m.suggestions.get(suggestion))
                .cloned()
            else {
                return false;
            };
            state.prompt_history.push(&text, "Assistant");
            state.editable_prompt = text;
            if let Some(m) = state.chat.get_mut(message) {
                m.applied = true;
            }
            true
        })
    }

    pub fn clear_chat(&self) {
        self.update(|state| state.chat.clear());
    }

    /// Quick single-call prompt for the source image. The editable prompt is
    /// left alone.
    pub async fn reverse_prompt(&self) -> Result<Option<String>> {
        let Some(source) = self.lock_state().source.clone() else {
            self.notify(NoticeLevel::Info, "Load an image first");
            return Ok(None);
        };
        if !self.require_credentials() {
            return Ok(None);
        }
        let request = GenerationRequest::new(
            self.config().models.fast.clone(),
            vec![source.to_part(), Part::text(REVERSE_PROMPT)],
        );
        match self.inner.client.generate(request).await {
            Ok(response) => Ok(Some(response.text().unwrap_or_default())),
            Err(e) => {
                self.notify(NoticeLevel::Error, "Reverse analysis failed");
                Err(e.into())
            }
        }
    }

    /// Compares the source with the generated image under the current prompt
    /// and suggests what to do next.
    pub async fn smart_analysis(&self) -> Result<Option<String>> {
        let (source, generated, prompt) = {
            let state = self.lock_state();
            let (Some(source), Some(generated)) =
                (state.source.clone(), state.generated_image.clone())
            else {
                return Ok(None);
            };
            (source, generated, state.editable_prompt.clone())
        };
        if !self.require_credentials() {
            return Ok(None);
        }
        let request = GenerationRequest::new(
            self.config().models.fast.clone(),
            vec![
                source.to_part(),
                Part::inline("image/png", &generated),
                Part::text(format!("Prompt used: {}", prompt)),
            ],
        )
        .with_system_instruction(SMART_ANALYSIS_INSTRUCTION);
        match self.inner.client.generate(request).await {
            Ok(response) => Ok(Some(
                response
                    .text()
                    .unwrap_or_else(|| SMART_ANALYSIS_FALLBACK.to_string()),
            )),
            Err(e) => {
                self.notify(NoticeLevel::Error, "Smart analysis failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_intent() {
        assert_eq!(detect_intent("Please CHECK the result"), SkillIntent::QualityCheck);
        assert_eq!(detect_intent("帮我质检一下"), SkillIntent::QualityCheck);
        assert_eq!(detect_intent("reverse this image"), SkillIntent::Reverse);
        assert_eq!(detect_intent("逆向提示词"), SkillIntent::Reverse);
        assert_eq!(detect_intent("refine: warmer light"), SkillIntent::Refine);
        assert_eq!(detect_intent("改成黄昏"), SkillIntent::Refine);
        assert_eq!(detect_intent("translate it"), SkillIntent::Translate);
        assert_eq!(detect_intent("generate two more"), SkillIntent::Generate);
        assert_eq!(detect_intent("hello there"), SkillIntent::Chat);
    }

    #[test]
    fn test_detect_intent_first_match_wins() {
        assert_eq!(detect_intent("audit then refine"), SkillIntent::QualityCheck);
        assert_eq!(detect_intent("refine and translate"), SkillIntent::Refine);
    }

    #[test]
    fn test_skill_result_message() {
        let message = ChatMessage::skill_result(SkillIntent::Reverse, "prompt", vec!["prompt".into()]);
        assert_eq!(message.role, ChatRole::SkillResult);
        assert_eq!(message.skill, Some(SkillIntent::Reverse));
        assert!(!message.applied);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "skill-result");
        assert_eq!(json["skill"], "reverse");
    }
}
