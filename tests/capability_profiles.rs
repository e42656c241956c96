// tests/capability_profiles.rs
use techpress::error::PipelineError;
use techpress::llm::{Capability, ProfileBuilder, ToolChoice};

#[test]
fn same_inputs_build_identical_requests() {
    let builder = ProfileBuilder::default();
    for cap in Capability::ALL {
        let a = builder.request(cap, "system prompt", "user prompt");
        let b = builder.request(cap, "system prompt", "user prompt");
        assert_eq!(a, b, "{cap} is not deterministic");
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}

#[test]
fn capability_table() {
    let builder = ProfileBuilder::default();

    let chat = builder.request(Capability::Chat, "s", "u");
    assert_eq!(chat.model, "gpt-4o");
    assert_eq!(chat.max_output_tokens, Some(8192));
    assert!(!chat.uses_web_search());

    let find = builder.request(Capability::Find, "s", "u");
    assert_eq!(find.model, "gpt-4o");
    assert!(find.uses_web_search());
    assert_eq!(find.tool_choice, Some(ToolChoice::Required));

    let search = builder.request(Capability::Search, "s", "u");
    assert_eq!(search.model, "o4-mini");
    assert!(search.uses_web_search());
    assert_eq!(search.tool_choice, None);

    let reasoner = builder.request(Capability::Reasoner, "s", "u");
    assert_eq!(reasoner.model, "o4-mini");
    assert!(reasoner.reasoning.is_some());
    assert!(!reasoner.uses_web_search());

    let research = builder.request(Capability::Research, "s", "u");
    assert_eq!(research.model, "o4-mini-deep-research");
    assert!(research.uses_web_search());
}

#[test]
fn unknown_capability_names_fail() {
    assert_eq!("SEARCH".parse::<Capability>().unwrap(), Capability::Search);
    let err = "telepathy".parse::<Capability>().unwrap_err();
    assert!(matches!(err, PipelineError::UnknownCapability(name) if name == "telepathy"));
}
