use std::collections::HashMap;

use super::protocol::ToolDescriptor;
use crate::clients::ToolDefinition;
use crate::schema;

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTool {
    pub server_id: String,
    pub descriptor: ToolDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server's catalog. A name that is already known is
    /// re-pointed at `server_id`.
    pub fn register(&mut self, server_id: &str, tools: Vec<ToolDescriptor>) {
        for descriptor in tools {
            let name = descriptor.name.clone();
            let entry = RegisteredTool {
                server_id: server_id.to_string(),
                descriptor,
            };
            match self.tools.insert(name.clone(), entry) {
                Some(previous) => tracing::warn!(
                    "Tool '{name}' from [{server_id}] replaces the one from [{}]",
                    previous.server_id
                ),
                None => self.order.push(name),
            }
        }
    }

    pub fn resolve(&self, tool_name: &str) -> Option<&str> {
        self.tools.get(tool_name).map(|t| t.server_id.as_str())
    }

    pub fn get(&self, tool_name: &str) -> Option<&RegisteredTool> {
        self.tools.get(tool_name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|t| (name.as_str(), t.server_id.as_str()))
            })
            .collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.descriptor.name.clone(),
                description: t.descriptor.description.clone(),
                parameters: schema::adapt(&t.descriptor.input_schema),
            })
            .collect()
    }
}
