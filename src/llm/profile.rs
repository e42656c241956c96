//! Capability table: which model, tools and limits each capability uses.

use crate::config::ModelTable;

use super::{
    Capability, InputMessage, Reasoning, ReasoningEffort, ResponseRequest, SearchContextSize,
    TextOptions, Tool, ToolChoice, UserLocation,
};

/// Web-search attachment of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSearch {
    pub context_size: SearchContextSize,
    pub approximate_location: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityProfile {
    pub capability: Capability,
    pub model: String,
    pub max_output_tokens: Option<u32>,
    pub force_tools: bool,
    pub web_search: Option<WebSearch>,
    pub reasoning: Option<ReasoningEffort>,
}

impl CapabilityProfile {
    /// Request body for a system + user prompt pair.
    pub fn request(&self, system: &str, user: &str) -> ResponseRequest {
        let tools: Vec<Tool> = self
            .web_search
            .map(|ws| Tool::WebSearchPreview {
                search_context_size: ws.context_size,
                user_location: ws.approximate_location.then(UserLocation::approximate),
            })
            .into_iter()
            .collect();

        let tool_choice = (self.force_tools && !tools.is_empty()).then_some(ToolChoice::Required);

        ResponseRequest {
            model: self.model.clone(),
            input: vec![
                InputMessage::new("system", system),
                InputMessage::new("user", user),
            ],
            text: TextOptions::default(),
            max_output_tokens: self.max_output_tokens,
            tools,
            tool_choice,
            reasoning: self.reasoning.map(|effort| Reasoning { effort }),
        }
    }
}

/// Builds profiles from the configured model table; a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    models: ModelTable,
    max_output_tokens: u32,
}

impl ProfileBuilder {
    pub fn new(models: ModelTable, max_output_tokens: u32) -> Self {
        Self {
            models,
            max_output_tokens,
        }
    }

    pub fn profile(&self, capability: Capability) -> CapabilityProfile {
        let cap = Some(self.max_output_tokens);
        let (model, max_output_tokens, force_tools, web_search, reasoning) = match capability {
            Capability::Chat => (&self.models.chat, cap, false, None, None),
            Capability::Find => (
                &self.models.chat,
                cap,
                true,
                Some(WebSearch {
                    context_size: SearchContextSize::Medium,
                    approximate_location: false,
                }),
                None,
            ),
            Capability::Search => (
                &self.models.reasoning,
                None,
                false,
                Some(WebSearch {
                    context_size: SearchContextSize::High,
                    approximate_location: true,
                }),
                None,
            ),
            Capability::Reasoner => (
                &self.models.reasoning,
                None,
                false,
                None,
                Some(ReasoningEffort::Medium),
            ),
            Capability::Research => (
                &self.models.research,
                None,
                false,
                Some(WebSearch {
                    context_size: SearchContextSize::Medium,
                    approximate_location: false,
                }),
                None,
            ),
        };

        CapabilityProfile {
            capability,
            model: model.clone(),
            max_output_tokens,
            force_tools,
            web_search,
            reasoning,
        }
    }

    pub fn request(&self, capability: Capability, system: &str, user: &str) -> ResponseRequest {
        self.profile(capability).request(system, user)
    }
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new(ModelTable::default(), 8192)
    }
}
