//! Agent roles and their built-in instructions.
//!
//! Each stage of the analysis pipeline is played by one agent role. The
//! instruction texts live in `prompts/` and are compiled into the binary;
//! the prompt library can override them per role at runtime.

use serde::{Deserialize, Serialize};

/// One named step in the analysis sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Auditor,
    Descriptor,
    Architect,
    Synthesizer,
    Critic,
    SoraVideographer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Auditor,
        AgentRole::Descriptor,
        AgentRole::Architect,
        AgentRole::Synthesizer,
        AgentRole::Critic,
        AgentRole::SoraVideographer,
    ];

    /// Stable identifier, also used as the stage delimiter in pipeline context.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Auditor => "AUDITOR",
            AgentRole::Descriptor => "DESCRIPTOR",
            AgentRole::Architect => "ARCHITECT",
            AgentRole::Synthesizer => "SYNTHESIZER",
            AgentRole::Critic => "CRITIC",
            AgentRole::SoraVideographer => "SORA_VIDEOGRAPHER",
        }
    }

    pub fn parse(s: &str) -> Option<AgentRole> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        AgentRole::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
    }

    pub fn profile(&self) -> &'static AgentProfile {
        match self {
            AgentRole::Auditor => &PROFILES[0],
            AgentRole::Descriptor => &PROFILES[1],
            AgentRole::Architect => &PROFILES[2],
            AgentRole::Synthesizer => &PROFILES[3],
            AgentRole::Critic => &PROFILES[4],
            AgentRole::SoraVideographer => &PROFILES[5],
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an agent role.
#[derive(Debug)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub name: &'static str,
    pub description: &'static str,
    pub system_instruction: &'static str,
}

static PROFILES: [AgentProfile; 6] = [
    AgentProfile {
        role: AgentRole::Auditor,
        name: "Asset Auditor",
        description: "Classifies the commercial visual type, recognizes known IP, people and product models, and sets the replication tone.",
        system_instruction: include_str!("../prompts/auditor.md"),
    },
    AgentProfile {
        role: AgentRole::Descriptor,
        name: "Texture Scanner",
        description: "Extracts high-fidelity detail: material texture, gloss, wear marks and on-image text.",
        system_instruction: include_str!("../prompts/descriptor.md"),
    },
    AgentProfile {
        role: AgentRole::Architect,
        name: "Spatial Architect",
        description: "Reverse-engineers lighting, lens, depth of field and the layout grid.",
        system_instruction: include_str!("../prompts/architect.md"),
    },
    AgentProfile {
        role: AgentRole::Synthesizer,
        name: "Prompt Engine",
        description: "Merges all analysis, picks replication or fusion mode and writes the final prompt.",
        system_instruction: include_str!("../prompts/synthesizer.md"),
    },
    AgentProfile {
        role: AgentRole::Critic,
        name: "Quality Assurance",
        description: "Compares source and replica and feeds corrections back into the prompt.",
        system_instruction: include_str!("../prompts/critic.md"),
    },
    AgentProfile {
        role: AgentRole::SoraVideographer,
        name: "Video Replicator",
        description: "Reverse-engineers video shots, motion and light into a replication script.",
        system_instruction: include_str!("../prompts/sora_videographer.md"),
    },
];

/// Stage order of a regular replication run.
pub const PIPELINE_ORDER: [AgentRole; 4] = [
    AgentRole::Auditor,
    AgentRole::Descriptor,
    AgentRole::Architect,
    AgentRole::Synthesizer,
];

/// Stage order when a product image is fused into the reference scene.
pub const FUSION_ORDER: [AgentRole; 4] = [
    AgentRole::Auditor,
    AgentRole::Architect,
    AgentRole::Descriptor,
    AgentRole::Synthesizer,
];

/// Instruction used by the single-stage video director run.
pub const VIDEO_DIRECTOR_INSTRUCTION: &str = include_str!("../prompts/video_director.md");
