//! Layout detection results and parsing of the model's JSON reply.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Instruction sent alongside the image for layout detection.
pub const LAYOUT_PROMPT: &str = "Analyze the layout of this image. Identify key elements (buttons, text blocks, images, navigation, hero sections, etc.).
Return a JSON array of objects with the following schema:
{
   \"box_2d\": [ymin, xmin, ymax, xmax],
   \"label\": \"element name\",
   \"hierarchy\": \"Primary\" | \"Secondary\" | \"Tertiary\"
}
Output ONLY valid JSON.";

/// One detected element. `box_2d` is `[ymin, xmin, ymax, xmax]` normalized
/// to 0-1000.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub box_2d: [f64; 4],
    pub label: String,
    #[serde(default)]
    pub hierarchy: String,
}

static RE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```json\n?|\n?```").unwrap());

/// Parses the reply, stripping markdown code fences. Anything that does not
/// parse as a list of elements yields an empty list.
pub fn parse_layout_response(text: &str) -> Vec<LayoutElement> {
    let cleaned = RE_FENCE.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<LayoutElement>>(cleaned) {
        Ok(elements) => elements,
        Err(e) => {
            log::warn!("Layout detection returned unparseable JSON: {}", e);
            Vec::new()
        }
    }
}
