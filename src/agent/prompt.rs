//! Prompt templates for the agent.

use crate::tools::ToolRegistry;

/// Request appended to the history when a budget runs out.
pub const SUMMARY_PROMPT: &str = "Summarize the conversation. Focus on the main facts, any \
uncertainties, and recommend one next step. Do not repeat raw tool outputs verbatim; \
synthesize them. Aim at responding to the user's original question as well as the provided \
material allows. State what you didn't manage to achieve.";

/// Used when the summary request itself fails.
pub const SUMMARY_FALLBACK: &str = "I couldn't produce a summary due to an error.";

pub fn iteration_limit_message(max_iterations: usize, summary: &str) -> String {
    format!(
        "I've reached the maximum number of reasoning steps ({}). Here's what I found:\n\n{}",
        max_iterations, summary
    )
}

pub fn time_limit_message(summary: &str) -> String {
    format!(
        "I've reached the time limit for this query. Here's what I found:\n\n{}",
        summary
    )
}

pub fn model_error_message(error: &str) -> String {
    format!(
        "I encountered an error while processing your request: {}. Please try rephrasing \
         your question or breaking it into smaller parts.",
        error
    )
}

/// Default system prompt listing the registered tools.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a research assistant answering questions about scientific papers, their authors, methods and citations. You work by calling tools against a knowledge graph and reasoning over what they return.

## Available Tools
{tool_descriptions}

## Rules
1. Use tools to look facts up - don't answer from memory when the graph can tell you
2. Resolve names to node ids with search_nodes before using tools that take a node id
3. Prefer a few targeted queries over many broad ones
4. If a tool fails, adjust the arguments or try a different tool
5. Say clearly when the graph does not contain what was asked

## Response
When you have enough information, answer the question directly and mention the papers or authors your answer rests on."#,
        tool_descriptions = tool_descriptions
    )
}
