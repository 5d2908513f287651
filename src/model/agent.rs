use serde::Serialize;

/// Closed catalog of chat personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgentKind {
    #[default]
    WritingAssistant,
    CodeReviewer,
    DataAnalyst,
    LanguageTutor,
    FitnessCoach,
    TravelPlanner,
}

pub const ALL_AGENTS: &[AgentKind] = &[
    AgentKind::WritingAssistant,
    AgentKind::CodeReviewer,
    AgentKind::DataAnalyst,
    AgentKind::LanguageTutor,
    AgentKind::FitnessCoach,
    AgentKind::TravelPlanner,
];

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub system_prompt: &'static str,
}

impl AgentKind {
    /// Total lookup: anything unrecognised resolves to the default persona.
    pub fn resolve(id: Option<&str>) -> Self {
        id.and_then(Self::find).unwrap_or_default()
    }

    pub fn find(id: &str) -> Option<Self> {
        let id = id.trim();
        ALL_AGENTS
            .iter()
            .copied()
            .find(|kind| kind.agent().id.eq_ignore_ascii_case(id))
    }

    pub fn agent(&self) -> Agent {
        match self {
            AgentKind::WritingAssistant => Agent {
                id: "writing-assistant",
                name: "Writing Assistant",
                description: "Professional writing helper for emails, documents, and creative content",
                category: "Productivity",
                system_prompt: "You are a professional writing assistant. Help users with emails, documents, creative writing, and editing. Provide clear, well-structured, and engaging content.",
            },
            AgentKind::CodeReviewer => Agent {
                id: "code-reviewer",
                name: "Code Reviewer",
                description: "Expert code analysis and optimization suggestions for developers",
                category: "Development",
                system_prompt: "You are an expert code reviewer and software engineer. Analyze code for bugs, performance issues, best practices, and provide optimization suggestions.",
            },
            AgentKind::DataAnalyst => Agent {
                id: "data-analyst",
                name: "Data Analyst",
                description: "Transform raw data into actionable insights and visualizations",
                category: "Analytics",
                system_prompt: "You are a data analyst expert. Help users analyze data, create insights, suggest visualizations, and interpret statistical information.",
            },
            AgentKind::LanguageTutor => Agent {
                id: "language-tutor",
                name: "Language Tutor",
                description: "Personalized language learning with conversation practice",
                category: "Education",
                system_prompt: "You are a friendly language tutor. Help users learn languages through conversation, grammar explanations, vocabulary building, and cultural insights.",
            },
            AgentKind::FitnessCoach => Agent {
                id: "fitness-coach",
                name: "Fitness Coach",
                description: "Customized workout plans and nutrition guidance",
                category: "Health",
                system_prompt: "You are a certified fitness coach and nutritionist. Provide workout plans, nutrition advice, and health guidance tailored to individual goals and fitness levels.",
            },
            AgentKind::TravelPlanner => Agent {
                id: "travel-planner",
                name: "Travel Planner",
                description: "Create detailed itineraries and travel recommendations",
                category: "Travel",
                system_prompt: "You are an experienced travel planner. Help users create itineraries, find accommodations, suggest activities, and provide travel tips for destinations worldwide.",
            },
        }
    }
}

impl Agent {
    pub fn welcome_text(&self) -> String {
        format!(
            "Hello! I'm {}. {} How can I help you today?",
            self.name, self.description
        )
    }
}
