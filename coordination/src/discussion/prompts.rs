//! Prompt construction for the discussion protocol.

use crate::config::DiscussionConfig;
use crate::registry::{Agent, UNRESTRICTED_PREAMBLE};

use super::state::RoundMessage;

const SUMMARY_INSTRUCTIONS: &str = "Synthesize the key points of agreement between the participants. \
Focus on concrete points they all seem to agree on. Be concise (max 150 words) but comprehensive. \
Format your summary in clear, structured points. This summary will be used as a foundation for \
the next iteration if accepted. Reflect the actual topic being discussed.";

const FINAL_OUTPUT_SYSTEM: &str = "You are a discussion synthesizer. Based on the topic description \
and all accepted summaries from the discussion iterations, create a comprehensive final output that \
represents the collective insights. Format it as a well-structured markdown document. Choose \
sections that fit the subject: for a software project that might be an executive summary, \
architecture overview and implementation plan; for a philosophical topic, key arguments and points \
of agreement and disagreement. Do not force the content into a template that does not fit.";

/// Shared context: topic, accepted summaries, and the current round.
pub fn discussion_context(
    config: &DiscussionConfig,
    summaries: &[String],
    round: &[RoundMessage],
    rejection_feedback: Option<&str>,
) -> String {
    let mut context = format!(
        "Topic Name: {}\nTopic Description: {}\n",
        config.topic_name, config.topic_description
    );

    if !summaries.is_empty() {
        context.push_str("\nAccepted Summaries:\n");
        for (i, summary) in summaries.iter().enumerate() {
            context.push_str(&format!("Summary {}: {}\n", i + 1, summary));
        }
    }

    if let Some(feedback) = rejection_feedback {
        context.push_str("\nThe previous summary was rejected. Objections raised:\n");
        context.push_str(feedback);
        context.push('\n');
    }

    if !round.is_empty() {
        context.push_str("\nCurrent Discussion:\n");
        for message in round {
            context.push_str(&format!("{}: {}\n", message.display_name, message.content));
        }
    }

    context
}

/// Prompt for one discussion turn.
pub fn turn_prompt(agent: &Agent, context: &str, opening: bool) -> String {
    let instruction = if opening {
        "Open the discussion on this topic from your perspective."
    } else {
        "Continue the discussion. Respond to the points already made, build on them or challenge them, and add your own perspective."
    };
    format!("{}\n\n{}\n\n{}", context, instruction, agent.role_enforcement())
}

/// System prompt for the synthesizer when summarizing.
pub fn summary_system_prompt(synthesizer: &Agent, unrestricted_mode: bool, custom_instructions: &str) -> String {
    let mut prompt = synthesizer.system_prompt(unrestricted_mode);
    if synthesizer.params.system_prompt_override.is_none() {
        prompt.push_str("\n\n");
        prompt.push_str(SUMMARY_INSTRUCTIONS);
    }
    if !custom_instructions.trim().is_empty() {
        prompt.push_str("\n\nAdditional instructions: ");
        prompt.push_str(custom_instructions.trim());
    }
    prompt
}

/// Prompt asking an agent to vote on a candidate summary.
pub fn vote_prompt(agent: &Agent, round: &[RoundMessage], summary: &str) -> String {
    let mut prompt = format!(
        "You need to vote on whether to accept the following summary of your discussion. \
         You are the same {name} that participated in the discussion; stay consistent with \
         your previous statements. If the summary accurately captures the points of agreement, \
         respond with \"I accept this summary\". If not, respond with \"I reject this summary\" \
         and briefly explain why. Keep your response under 50 words.\n\n",
        name = agent.display_name
    );
    if !round.is_empty() {
        prompt.push_str("Previous discussion:\n");
        for message in round {
            prompt.push_str(&format!("{}: {}\n", message.display_name, message.content));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "The synthesizer has provided this summary of your discussion:\n\n\"{}\"\n\nDo you accept this summary?",
        summary
    ));
    prompt
}

/// System prompt for the final artifact.
pub fn final_output_system_prompt(synthesizer: &Agent, unrestricted_mode: bool) -> String {
    let overridden = synthesizer
        .params
        .system_prompt_override
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    if overridden {
        synthesizer.system_prompt(unrestricted_mode)
    } else if unrestricted_mode {
        format!("{}\n\n{}", UNRESTRICTED_PREAMBLE, FINAL_OUTPUT_SYSTEM)
    } else {
        FINAL_OUTPUT_SYSTEM.to_string()
    }
}

/// Prompt listing every accepted summary for the final artifact.
pub fn final_output_prompt(config: &DiscussionConfig, summaries: &[String]) -> String {
    let mut prompt = format!(
        "Topic Name: {}\nTopic Description: {}\n\nAccepted Summaries from All Iterations:\n",
        config.topic_name, config.topic_description
    );
    for (i, summary) in summaries.iter().enumerate() {
        prompt.push_str(&format!("Iteration {}:\n{}\n\n", i + 1, summary));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;

    fn mock_config() -> DiscussionConfig {
        DiscussionConfig {
            topic_name: "Urban gardens".into(),
            topic_description: "How should a city support community gardens?".into(),
            ..Default::default()
        }
    }

    fn mock_round() -> Vec<RoundMessage> {
        vec![
            RoundMessage {
                agent_id: Some("network1".into()),
                display_name: "Analytical Network".into(),
                content: "Start with a land survey.".into(),
            },
            RoundMessage {
                agent_id: None,
                display_name: "User".into(),
                content: "Consider water costs.".into(),
            },
        ]
    }

    #[test]
    fn test_context_sections() {
        let context = discussion_context(&mock_config(), &["Survey first.".into()], &mock_round(), None);
        assert!(context.starts_with("Topic Name: Urban gardens\n"));
        assert!(context.contains("Accepted Summaries:\nSummary 1: Survey first.\n"));
        assert!(context.contains("Current Discussion:\nAnalytical Network: Start with a land survey.\nUser: Consider water costs.\n"));
        assert!(!context.contains("rejected"));
    }

    #[test]
    fn test_context_with_rejection_feedback() {
        let context = discussion_context(&mock_config(), &[], &[], Some("Creative Network: too vague"));
        assert!(context.contains("The previous summary was rejected."));
        assert!(context.contains("Creative Network: too vague"));
        assert!(!context.contains("Accepted Summaries"));
    }

    #[test]
    fn test_turn_prompt_enforces_role() {
        let registry = AgentRegistry::with_default_roster();
        let agent = registry.get("network2").unwrap();
        let prompt = turn_prompt(agent, "ctx", false);
        assert!(prompt.starts_with("ctx\n\nContinue the discussion."));
        assert!(prompt.ends_with("Focus on your specific role: Creative thinking and innovative perspectives."));
    }

    #[test]
    fn test_summary_system_prompt_custom_instructions() {
        let registry = AgentRegistry::with_default_roster();
        let synth = registry.synthesizer().unwrap();
        let prompt = summary_system_prompt(synth, false, "Use bullet points.");
        assert!(prompt.contains("Synthesize the key points"));
        assert!(prompt.ends_with("Additional instructions: Use bullet points."));
    }

    #[test]
    fn test_final_output_prompt_lists_iterations() {
        let prompt = final_output_prompt(&mock_config(), &["A".into(), "B".into()]);
        assert!(prompt.contains("Iteration 1:\nA\n"));
        assert!(prompt.contains("Iteration 2:\nB\n"));
    }
}
