//! Static agent registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompts::system_prompt;

/// Closed set of agent types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    InvestmentAdvisor,
    TradingAgent,
}

impl AgentType {
    pub const ALL: [AgentType; 2] = [AgentType::InvestmentAdvisor, AgentType::TradingAgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::InvestmentAdvisor => "investment_advisor",
            AgentType::TradingAgent => "trading_agent",
        }
    }

    /// Built-in descriptor, before configuration overrides.
    fn base_descriptor(self) -> AgentDescriptor {
        match self {
            AgentType::InvestmentAdvisor => AgentDescriptor {
                agent_type: self,
                name: "Investment Advisor",
                description: "Professional investment analyst offering market analysis, risk assessment and investment advice",
                icon: "chart.line.uptrend.xyaxis",
                color: "#4CAF50",
                system_prompt: system_prompt(self),
                sampling: SamplingParams {
                    temperature: 0.7,
                    max_tokens: 2000,
                },
            },
            AgentType::TradingAgent => AgentDescriptor {
                agent_type: self,
                name: "Trading Agent",
                description: "Trading assistant that walks through order placement and position management",
                icon: "arrow.left.arrow.right",
                color: "#2196F3",
                system_prompt: system_prompt(self),
                // Lower temperature keeps trade parameters precise.
                sampling: SamplingParams {
                    temperature: 0.5,
                    max_tokens: 2000,
                },
            },
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investment_advisor" => Ok(AgentType::InvestmentAdvisor),
            "trading_agent" => Ok(AgentType::TradingAgent),
            _ => Err(UnknownAgent(s.to_string())),
        }
    }
}

/// The agent type is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid agent type: {0}")]
pub struct UnknownAgent(pub String);

/// Model sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything needed to run a turn against one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentDescriptor {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    #[serde(skip)]
    pub system_prompt: &'static str,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

/// Per-agent sampling overrides from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Maps agent-type identifiers to descriptors.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    overrides: HashMap<AgentType, AgentOverride>,
}

impl AgentRegistry {
    /// Registry with built-in parameters only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with configured overrides, keyed by agent-type string.
    ///
    /// Fails on keys that do not name a registered agent so a typo in the
    /// config file is reported at startup.
    pub fn with_overrides(overrides: &HashMap<String, AgentOverride>) -> Result<Self, UnknownAgent> {
        let overrides = overrides
            .iter()
            .map(|(key, value)| Ok((key.parse::<AgentType>()?, *value)))
            .collect::<Result<HashMap<_, _>, UnknownAgent>>()?;
        Ok(Self { overrides })
    }

    /// Resolve an agent-type identifier.
    pub fn lookup(&self, agent_type: &str) -> Result<AgentDescriptor, UnknownAgent> {
        let agent_type: AgentType = agent_type.parse()?;
        Ok(self.descriptor(agent_type))
    }

    /// All registered agents, in a stable order.
    pub fn available(&self) -> Vec<AgentDescriptor> {
        AgentType::ALL.iter().map(|t| self.descriptor(*t)).collect()
    }

    fn descriptor(&self, agent_type: AgentType) -> AgentDescriptor {
        let mut descriptor = agent_type.base_descriptor();
        if let Some(o) = self.overrides.get(&agent_type) {
            if let Some(temperature) = o.temperature {
                descriptor.sampling.temperature = temperature;
            }
            if let Some(max_tokens) = o.max_tokens {
                descriptor.sampling.max_tokens = max_tokens;
            }
        }
        descriptor
    }
}
