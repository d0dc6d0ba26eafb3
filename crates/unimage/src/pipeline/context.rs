use std::collections::BTreeMap;

use crate::agents::AgentRole;
use crate::asset::Asset;
use crate::client::Part;

pub const BASE_PROMPT: &str = "Analyze the input based on your role.";

pub struct PipelineContext {
    // Input
    pub source: Asset,

    // Set only for fusion runs
    pub product: Option<Asset>,

    // Resolved execution order
    pub stages: Vec<AgentRole>,

    // System instruction per role; roles without an entry use their profile
    pub instructions: BTreeMap<AgentRole, String>,

    // Accumulated "\n--ROLE--\n<output>" blocks of completed stages
    pub context: String,

    // Output per completed stage, in execution order
    pub outputs: Vec<(AgentRole, String)>,
}

impl PipelineContext {
    pub fn new(source: Asset, stages: Vec<AgentRole>) -> Self {
        Self {
            source,
            product: None,
            stages,
            instructions: BTreeMap::new(),
            context: String::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_product(mut self, product: Option<Asset>) -> Self {
        self.product = product;
        self
    }

    pub fn with_instruction(mut self, role: AgentRole, instruction: impl Into<String>) -> Self {
        self.instructions.insert(role, instruction.into());
        self
    }

    /// Image parts for a stage. With a product image the Descriptor looks at
    /// the product alone and the Synthesizer sees source and product.
    pub fn inputs_for(&self, role: AgentRole) -> Vec<Part> {
        match (&self.product, role) {
            (Some(product), AgentRole::Descriptor) => vec![product.to_part()],
            (Some(product), AgentRole::Synthesizer) => {
                vec![self.source.to_part(), product.to_part()]
            }
            _ => vec![self.source.to_part()],
        }
    }

    pub fn instruction_for(&self, role: AgentRole) -> &str {
        self.instructions
            .get(&role)
            .map(String::as_str)
            .unwrap_or(role.profile().system_instruction)
    }

    pub fn prompt(&self) -> String {
        if self.context.is_empty() {
            BASE_PROMPT.to_string()
        } else {
            format!(
                "{}\n\nContext from previous agents:\n{}",
                BASE_PROMPT, self.context
            )
        }
    }

    pub fn record(&mut self, role: AgentRole, content: &str) {
        self.context.push_str(&format!("\n--{}--\n{}", role.as_str(), content));
        self.outputs.push((role, content.to_string()));
    }

    /// Output of the last completed stage.
    pub fn final_output(&self) -> Option<&str> {
        self.outputs.last().map(|(_, content)| content.as_str())
    }
}
