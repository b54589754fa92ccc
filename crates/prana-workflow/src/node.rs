//! Node: one step of a workflow.

use crate::data::{NodeSettings, ParamMap};
use serde::{Deserialize, Serialize};

/// What role a node plays in a workflow, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Action,
    Logic,
    Wait,
    Output,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Action => "action",
            NodeType::Logic => "logic",
            NodeType::Wait => "wait",
            NodeType::Output => "output",
        }
    }
}

/// One node of a `Workflow`, user-authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub integration_name: String,
    pub action_name: String,
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default = "default_input_ports")]
    pub input_ports: Vec<String>,
    #[serde(default = "default_output_ports")]
    pub output_ports: Vec<String>,
    #[serde(default)]
    pub settings: NodeSettings,
}

fn default_input_ports() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_output_ports() -> Vec<String> {
    vec!["success".to_string()]
}

impl Node {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        node_type: NodeType,
        integration_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        let input_ports = if node_type == NodeType::Trigger {
            Vec::new()
        } else {
            default_input_ports()
        };
        Self {
            key: key.into(),
            name: name.into(),
            node_type,
            integration_name: integration_name.into(),
            action_name: action_name.into(),
            params: ParamMap::new(),
            input_ports,
            output_ports: default_output_ports(),
            settings: NodeSettings::default(),
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.node_type == NodeType::Trigger
    }

    pub fn is_logic(&self) -> bool {
        self.node_type == NodeType::Logic
    }

    pub fn integration_action(&self) -> (&str, &str) {
        (&self.integration_name, &self.action_name)
    }

    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    pub fn with_input_ports(mut self, ports: Vec<String>) -> Self {
        self.input_ports = ports;
        self
    }

    pub fn with_output_ports(mut self, ports: Vec<String>) -> Self {
        self.output_ports = ports;
        self
    }

    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        self.settings = settings;
        self
    }
}
