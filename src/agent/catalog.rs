//! Agent catalog
//!
//! The fixed set of agent profiles. Built once on first use and never
//! mutated; `get` is total over `AgentId`.

use std::sync::OnceLock;

use crate::core::{AgentId, AgentTool, ToolDeclaration};
use crate::tools::{calculator, car_search};

/// A named configuration of instruction text and permitted tools
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub id: AgentId,
    /// Name shown to the user
    pub display_name: &'static str,
    /// One-line summary for listings
    pub description: &'static str,
    /// When the router should pick this agent
    pub routing_hint: &'static str,
    pub system_instruction: &'static str,
    /// Tools advertised to the model, in order
    pub tools: Vec<AgentTool>,
    /// Tool names this agent is allowed to run locally
    pub executable: Vec<&'static str>,
}

impl AgentProfile {
    /// Function declarations among this agent's tools
    pub fn declarations(&self) -> impl Iterator<Item = &ToolDeclaration> {
        self.tools.iter().filter_map(|tool| match tool {
            AgentTool::Function(declaration) => Some(declaration),
            AgentTool::WebSearch => None,
        })
    }

    /// Whether a requested call may be executed for this agent
    pub fn can_execute(&self, tool_name: &str) -> bool {
        self.executable.contains(&tool_name)
    }
}

static CATALOG: OnceLock<Vec<AgentProfile>> = OnceLock::new();

/// All profiles, in `AgentId::ALL` order
pub fn all() -> &'static [AgentProfile] {
    CATALOG.get_or_init(build)
}

/// Profile for an agent id
pub fn get(id: AgentId) -> &'static AgentProfile {
    let index = match id {
        AgentId::Generalist => 0,
        AgentId::Researcher => 1,
        AgentId::Analyst => 2,
        AgentId::Coder => 3,
        AgentId::CarSpecialist => 4,
    };
    &all()[index]
}

fn build() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            id: AgentId::Generalist,
            display_name: "Assistant",
            description: "General helpful assistant",
            routing_hint: "For casual conversation, greetings, creative writing, or anything that doesn't fit the others.",
            system_instruction: "You are a helpful and concise AI assistant. Answer user questions directly.",
            tools: Vec::new(),
            executable: Vec::new(),
        },
        AgentProfile {
            id: AgentId::Researcher,
            display_name: "Researcher",
            description: "Uses Google Search for up-to-date info",
            routing_hint: "For questions about current events, news, facts requiring web search.",
            system_instruction: "You are a researcher. You have access to information. Always provide up-to-date information, news, or facts when asked.",
            tools: vec![AgentTool::WebSearch],
            executable: Vec::new(),
        },
        AgentProfile {
            id: AgentId::Analyst,
            display_name: "Analyst",
            description: "Uses calculator for precise math",
            routing_hint: "For math problems, calculations, logic puzzles involving numbers.",
            system_instruction: "You are a data analyst and mathematician. You MUST use the calculator tool for ANY arithmetic or math problem to ensure 100% precision. Do not calculate mentally.",
            tools: vec![AgentTool::Function(calculator::declaration())],
            executable: vec!["calculator"],
        },
        AgentProfile {
            id: AgentId::Coder,
            display_name: "Engineer",
            description: "Specialized in writing code",
            routing_hint: "For writing code, debugging, explaining programming concepts, or software architecture.",
            system_instruction: "You are a senior software engineer. Write clean, performant, and well-documented code. When providing code snippets, use the appropriate markdown language tags. Prefer modern best practices.",
            tools: Vec::new(),
            executable: Vec::new(),
        },
        AgentProfile {
            id: AgentId::CarSpecialist,
            display_name: "Auto Expert",
            description: "Search for vehicles and car prices",
            routing_hint: "For queries related to buying cars, searching for vehicles, checking car prices, or specific car models (e.g. \"Find me a Renault Clio\", \"Price of BMW\").",
            system_instruction: "You are a helpful car sales assistant. You have access to a tool to search for real cars for sale in France. When finding cars, ALWAYS display the image for each car using markdown `![Title](imageUrl)`. Present the details (Title, Price, Mileage, Year, Location) in a clean, structured list or table below each image. Be helpful and suggest relevant options.",
            tools: vec![AgentTool::Function(car_search::declaration())],
            executable: vec!["search_cars"],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_total_and_consistent() {
        for id in AgentId::ALL {
            assert_eq!(get(id).id, id);
        }
        assert_eq!(all().len(), AgentId::ALL.len());
    }

    #[test]
    fn test_executables_match_declarations() {
        for profile in all() {
            let declared: Vec<&str> = profile.declarations().map(|d| d.name.as_str()).collect();
            assert_eq!(declared, profile.executable, "agent {}", profile.id);
        }
    }

    #[test]
    fn test_tool_permissions() {
        assert!(get(AgentId::Analyst).can_execute("calculator"));
        assert!(!get(AgentId::Analyst).can_execute("search_cars"));
        assert!(get(AgentId::CarSpecialist).can_execute("search_cars"));
        assert_eq!(get(AgentId::Researcher).tools, vec![AgentTool::WebSearch]);
        assert!(get(AgentId::Generalist).tools.is_empty());
    }
}
