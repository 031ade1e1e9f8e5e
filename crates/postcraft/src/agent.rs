use crate::models::tool::Tool;
use crate::systems::System;

/// A named role: the instructions a model runs under plus the systems whose
/// tools it may call. Built once and not changed afterwards.
pub struct Agent {
    name: String,
    instructions: String,
    model: String,
    systems: Vec<Box<dyn System>>,
}

impl Agent {
    pub fn new<N, I, M>(name: N, instructions: I, model: M) -> Self
    where
        N: Into<String>,
        I: Into<String>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
            systems: Vec::new(),
        }
    }

    /// Bind a system's tools to this role
    pub fn with_system(mut self, system: Box<dyn System>) -> Self {
        self.systems.push(system);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The role instructions followed by those of each bound system
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        for system in &self.systems {
            if !system.instructions().is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(system.instructions());
            }
        }
        prompt
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// Find the system that owns a tool
    pub fn system_for_tool(&self, tool_name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.tools().iter().any(|tool| tool.name == tool_name))
            .map(|v| &**v)
    }
}
