//! Integration tests for the studio around a finished analysis: task
//! persistence, image history and the prompt tools.

mod common;

use common::{chunks, drain, notices, TestHarness};
use unimage::client::stub::PLACEHOLDER_PNG;
use unimage::client::StubReply;
use unimage::{
    AgentRole, AspectRatio, ChatRole, Language, NoticeLevel, SkillIntent, StubClient, StudioMode,
};

#[tokio::test]
async fn test_task_survives_restart() {
    let harness = TestHarness::with_client(StubClient::with_replies([
        chunks(&["audit"]),
        chunks(&["texture"]),
        chunks(&["light"]),
        chunks(&["final ", "prompt"]),
    ]));
    harness.load_source();
    harness.studio.process_image_pipeline().await;
    harness.studio.set_use_reference_image(true);

    let restored = harness.reopen();
    assert!(restored.restore().unwrap());

    let state = restored.state();
    assert_eq!(state.editable_prompt, "final prompt");
    assert_eq!(state.aspect_ratio, AspectRatio::Wide);
    assert!(state.use_reference_image);
    assert_eq!(state.prompt_history.len(), 1);
    assert_eq!(state.result(AgentRole::Architect).content(), "light");
    assert_eq!(state.source, harness.studio.state().source);
    assert!(!state.is_processing);
}

#[tokio::test]
async fn test_restore_with_empty_store() {
    let harness = TestHarness::new();
    assert!(!harness.studio.restore().unwrap());
    assert!(harness.studio.state().source.is_none());
}

#[tokio::test]
async fn test_reset_clears_cached_task() {
    let harness = TestHarness::new();
    harness.load_source();
    harness.studio.set_editable_prompt("draft");
    harness.studio.reset().unwrap();

    let state = harness.studio.state();
    assert!(state.source.is_none());
    assert!(state.editable_prompt.is_empty());
    assert!(!harness.reopen().restore().unwrap());
}

#[tokio::test]
async fn test_generate_records_history() {
    let harness = TestHarness::with_client(StubClient::with_replies([
        StubReply::Image(Some(PLACEHOLDER_PNG.to_string())),
        StubReply::Image(None),
    ]));
    harness.load_source();
    harness.studio.set_editable_prompt("a chrome teapot");
    let mut rx = harness.studio.subscribe();

    let items = harness.studio.generate_images(None, 2).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].prompt, "a chrome teapot");
    assert_eq!(items[0].detected_aspect_ratio, Some(AspectRatio::Wide));

    let requests = harness.client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, harness.studio.config().models.image);
    assert_eq!(requests[0].inline_parts().count(), 0);

    let state = harness.studio.state();
    assert_eq!(state.generated_images, vec![PLACEHOLDER_PNG]);
    assert_eq!(state.generated_image.as_deref(), Some(PLACEHOLDER_PNG));
    assert_eq!(state.selected_history_index, Some(0));
    assert!(!state.is_generating_image);
    assert_eq!(harness.studio.history_store().list().unwrap().len(), 1);

    let events = drain(&mut rx);
    assert_eq!(
        notices(&events, NoticeLevel::Success),
        vec!["Generated 1 image(s)"]
    );
}

#[tokio::test]
async fn test_generate_with_reference_image() {
    let harness = TestHarness::new();
    harness.load_source();
    harness.studio.set_use_reference_image(true);
    harness
        .studio
        .generate_images(Some("explicit prompt"), 1)
        .await
        .unwrap();

    let requests = harness.client.requests();
    assert_eq!(requests[0].inline_parts().count(), 1);
    assert_eq!(requests[0].prompt_text(), "explicit prompt");
}

#[tokio::test]
async fn test_history_load_delete_export() {
    let harness = TestHarness::new();
    harness.load_source();
    harness.studio.set_editable_prompt("first");
    harness.studio.generate_images(None, 1).await.unwrap();
    harness.studio.set_editable_prompt("second");
    harness.studio.generate_images(None, 1).await.unwrap();

    let state = harness.studio.state();
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.history[0].prompt, "second");

    harness.studio.set_editable_prompt("scratch");
    assert!(harness.studio.load_history_item(1));
    let state = harness.studio.state();
    assert_eq!(state.editable_prompt, "first");
    assert_eq!(state.prompt_cache.cn, "first");
    assert_eq!(state.selected_history_index, Some(1));
    assert!(!harness.studio.load_history_item(5));

    let out = harness.temp_path().join("export.png");
    let exported = harness.studio.export_image(0, &out).unwrap();
    assert_eq!(exported.as_deref(), Some(out.as_path()));
    assert!(image::open(&out).is_ok());
    assert!(harness
        .studio
        .export_image(9, &harness.temp_path().join("none.png"))
        .unwrap()
        .is_none());

    assert!(harness.studio.delete_history_item(0).unwrap());
    let state = harness.studio.state();
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.generated_images.len(), 1);
    assert_eq!(state.selected_history_index, Some(0));
    assert_eq!(harness.studio.history_store().list().unwrap().len(), 1);
    assert!(!harness.studio.delete_history_item(3).unwrap());
}

#[tokio::test]
async fn test_load_history_item_switches_fusion_mode() {
    let harness = TestHarness::new();
    harness.load_source();
    let product = harness.write_png("product.png", 10, 10);
    harness.studio.set_mode(StudioMode::Fusion);
    harness.studio.load_product(&product).unwrap();
    harness.studio.generate_images(Some("fused"), 1).await.unwrap();

    harness.studio.set_mode(StudioMode::Replicate);
    assert!(harness.studio.load_history_item(0));
    let state = harness.studio.state();
    assert_eq!(state.mode, StudioMode::Fusion);
    let product = state.product.expect("product restored from history");
    assert_eq!(product.mime_type, "image/png");
}

#[tokio::test]
async fn test_toggle_language_translates_once() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "a red lantern at dusk".into(),
    )]));
    harness.load_source();
    harness.studio.set_editable_prompt("黄昏时的红灯笼");

    assert_eq!(harness.studio.toggle_language().await.unwrap(), Language::En);
    let state = harness.studio.state();
    assert_eq!(state.editable_prompt, "a red lantern at dusk");
    assert_eq!(state.prompt_cache.cn, "黄昏时的红灯笼");
    assert!(state
        .prompt_history
        .latest()
        .unwrap()
        .starts_with("[English translation] "));

    let requests = harness.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, harness.studio.config().models.fast);
    assert!(requests[0].system_instruction.is_none());
    assert!(requests[0]
        .prompt_text()
        .starts_with("Translate the following to English (Midjourney prompt style): "));

    // Switching back is served from the cache
    assert_eq!(harness.studio.toggle_language().await.unwrap(), Language::Cn);
    assert_eq!(harness.studio.state().editable_prompt, "黄昏时的红灯笼");
    assert_eq!(harness.client.requests().len(), 1);
}

#[tokio::test]
async fn test_refine_prompt() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "a brighter teapot".into(),
    )]));
    harness.load_source();
    harness.studio.set_editable_prompt("a teapot");

    let refined = harness.studio.refine_prompt("make it brighter").await.unwrap();
    assert_eq!(refined.as_deref(), Some("a brighter teapot"));

    let state = harness.studio.state();
    assert_eq!(state.editable_prompt, "a brighter teapot");
    assert!(!state.is_refining_prompt);
    assert!(state.prompt_history.latest().unwrap().starts_with("[Refine] "));

    let request = &harness.client.requests()[0];
    assert_eq!(
        request.prompt_text(),
        "Original Prompt: a teapot\n\nFeedback/Request: make it brighter\n\nRefined Prompt:"
    );
    assert_eq!(request.inline_parts().count(), 0);
}

#[tokio::test]
async fn test_refine_failure_keeps_prompt() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Fail(
        "overloaded".into(),
    )]));
    harness.load_source();
    harness.studio.set_editable_prompt("a teapot");

    assert!(harness.studio.refine_prompt("more").await.is_err());
    let state = harness.studio.state();
    assert_eq!(state.editable_prompt, "a teapot");
    assert!(!state.is_refining_prompt);
}

#[tokio::test]
async fn test_detect_layout() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "```json\n[{\"box_2d\": [10, 20, 300, 400], \"label\": \"Hero\", \"hierarchy\": \"Primary\"}]\n```"
            .into(),
    )]));
    harness.load_source();

    let elements = harness.studio.detect_layout().await.unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].label, "Hero");
    assert_eq!(harness.studio.state().layout, Some(elements));
    assert!(!harness.studio.state().is_analyzing_layout);
}

#[tokio::test]
async fn test_quality_check_extracts_suggestions() {
    let harness = TestHarness::with_client(StubClient::with_replies([
        StubReply::Image(Some(PLACEHOLDER_PNG.to_string())),
        chunks(&[
            "Close match.\n",
            "1. Warm the light\n2. Sharpen edges\n",
            "3. Lower the camera\n4. Extra",
        ]),
    ]));
    harness.load_source();
    harness.studio.generate_images(Some("p"), 1).await.unwrap();

    let report = harness.studio.quality_check().await.unwrap().unwrap();
    assert!(report.starts_with("Close match."));

    let state = harness.studio.state();
    assert_eq!(
        state.suggestions,
        vec!["Warm the light", "Sharpen edges", "Lower the camera"]
    );
    assert!(state.result(AgentRole::Critic).is_complete());
    assert!(!state.is_checking_quality);

    let request = &harness.client.requests()[1];
    assert_eq!(request.inline_parts().count(), 2);
    assert_eq!(
        request.system_instruction.as_deref(),
        Some(AgentRole::Critic.profile().system_instruction)
    );
}

#[tokio::test]
async fn test_quality_check_needs_generated_image() {
    let harness = TestHarness::new();
    harness.load_source();
    assert!(harness.studio.quality_check().await.unwrap().is_none());
    assert!(harness.client.requests().is_empty());
}

#[tokio::test]
async fn test_chat_reverse_skill_offers_prompt() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "a copper kettle on slate".into(),
    )]));
    harness.load_source();

    let reply = harness
        .studio
        .send_chat_message("reverse this image")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.role, ChatRole::SkillResult);
    assert_eq!(reply.skill, Some(SkillIntent::Reverse));
    assert_eq!(reply.suggestions, vec!["a copper kettle on slate"]);

    let request = &harness.client.requests()[0];
    assert_eq!(request.inline_parts().count(), 1);
    assert!(request.prompt_text().starts_with("Perform a quick reverse engineering"));

    // Offered, not applied, until chosen
    assert_eq!(harness.studio.state().editable_prompt, "");
    assert!(harness.studio.apply_chat_suggestion(1, 0));
    let state = harness.studio.state();
    assert_eq!(state.editable_prompt, "a copper kettle on slate");
    assert!(state.chat[1].applied);
    assert!(state.prompt_history.latest().unwrap().starts_with("[Assistant] "));
    assert!(!harness.studio.apply_chat_suggestion(0, 0));
}

#[tokio::test]
async fn test_chat_refine_skill_keeps_prompt() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "a teapot at dusk".into(),
    )]));
    harness.load_source();
    harness.studio.set_editable_prompt("a teapot");

    let reply = harness
        .studio
        .send_chat_message("改成黄昏")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.skill, Some(SkillIntent::Refine));
    assert_eq!(reply.suggestions, vec!["a teapot at dusk"]);
    assert_eq!(harness.studio.state().editable_prompt, "a teapot");
    assert_eq!(
        harness.client.requests()[0].prompt_text(),
        "Current Prompt: a teapot\nInstruction: 改成黄昏\nRefined Prompt:"
    );
}

#[tokio::test]
async fn test_chat_quality_check_skill() {
    let harness = TestHarness::with_client(StubClient::with_replies([
        StubReply::Image(Some(PLACEHOLDER_PNG.to_string())),
        chunks(&["Good.\n1. Warm the light\n2. Sharpen edges"]),
    ]));
    harness.load_source();
    harness.studio.generate_images(Some("p"), 1).await.unwrap();

    let reply = harness
        .studio
        .send_chat_message("please check it")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.skill, Some(SkillIntent::QualityCheck));
    assert_eq!(reply.suggestions, vec!["Warm the light", "Sharpen edges"]);
    assert!(harness.studio.state().result(AgentRole::Critic).is_complete());
}

#[tokio::test]
async fn test_chat_falls_back_to_conversation() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Text(
        "Hi! Load an image to start.".into(),
    )]));

    // Quality check without images is answered as plain chat
    let reply = harness
        .studio
        .send_chat_message("can you check my work?")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.role, ChatRole::Assistant);
    assert_eq!(reply.content, "Hi! Load an image to start.");
    assert_eq!(
        harness.client.requests()[0].prompt_text(),
        "can you check my work?"
    );

    let state = harness.studio.state();
    assert_eq!(state.chat.len(), 2);
    assert_eq!(state.chat[0].role, ChatRole::User);
    assert!(!state.is_chatting);
}

#[tokio::test]
async fn test_chat_error_becomes_reply() {
    let harness = TestHarness::with_client(StubClient::with_replies([StubReply::Fail(
        "overloaded".into(),
    )]));

    let reply = harness.studio.send_chat_message("hello").await.unwrap().unwrap();
    assert_eq!(reply.role, ChatRole::Assistant);
    assert!(reply.content.starts_with("Sorry"));
    assert!(!harness.studio.state().is_chatting);

    assert!(harness.studio.send_chat_message("   ").await.unwrap().is_none());
    assert_eq!(harness.client.requests().len(), 1);
}

#[tokio::test]
async fn test_reverse_prompt_needs_source() {
    let harness = TestHarness::new();
    let mut rx = harness.studio.subscribe();
    assert!(harness.studio.reverse_prompt().await.unwrap().is_none());
    assert!(harness.client.requests().is_empty());
    assert_eq!(
        notices(&drain(&mut rx), NoticeLevel::Info),
        vec!["Load an image first"]
    );
}

#[tokio::test]
async fn test_smart_analysis() {
    let harness = TestHarness::with_client(StubClient::with_replies([
        StubReply::Image(Some(PLACEHOLDER_PNG.to_string())),
        StubReply::Text("Run `refine` with warmer light.".into()),
    ]));
    harness.load_source();
    assert!(harness.studio.smart_analysis().await.unwrap().is_none());

    harness.studio.set_editable_prompt("a teapot");
    harness.studio.generate_images(None, 1).await.unwrap();
    let advice = harness.studio.smart_analysis().await.unwrap();
    assert_eq!(advice.as_deref(), Some("Run `refine` with warmer light."));

    let request = &harness.client.requests()[1];
    assert_eq!(request.inline_parts().count(), 2);
    assert_eq!(request.prompt_text(), "Prompt used: a teapot");
    assert!(request
        .system_instruction
        .as_deref()
        .unwrap()
        .contains("suggest what command the user should run next"));
}
