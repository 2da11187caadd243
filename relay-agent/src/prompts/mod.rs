const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a smart assistant with access to tools on multiple servers.

You have a limit of {max_turns} turns (text, function calls, or both) per task. Plan carefully.

## Your job
1. Understand the user's request fully before acting by analysing it step by step.
2. Call tools in parallel, in a single turn, when the tasks are independent.
3. Use sequential calls only when one result depends on another.
4. Avoid unnecessary steps; combine or batch operations when possible.
5. Think before executing. Finish the task accurately and within the limit.

## Examples
- Bad: using 3 turns for 1 + 2 + 3
- Good: 1 + 2, then + 3, then the final answer (2 turns)
- Best: if supported, do everything at once (1 turn)

{tools_section}

Always minimize turns. Finish the task correctly."#;

pub fn build_system_prompt(
    tool_names: &[String],
    max_turns: usize,
    system_prompt: Option<&str>,
) -> String {
    if let Some(custom) = system_prompt.filter(|p| !p.trim().is_empty()) {
        return custom.to_string();
    }

    let tools_section = if tool_names.is_empty() {
        "You have no tools available; answer directly.".to_string()
    } else {
        format!("Available tools: {}.", tool_names.join(", "))
    };

    DEFAULT_SYSTEM_PROMPT
        .replace("{max_turns}", &max_turns.to_string())
        .replace("{tools_section}", &tools_section)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_system_prompt_with_tools() {
        let tools = vec!["add_numbers".to_string(), "run_command".to_string()];
        let prompt = build_system_prompt(&tools, 5, None);

        assert!(prompt.contains("limit of 5 turns"));
        assert!(prompt.contains("add_numbers, run_command"));
        assert!(prompt.contains("parallel"));
    }

    #[test]
    fn test_build_system_prompt_empty_tools() {
        let prompt = build_system_prompt(&[], 3, None);
        assert!(prompt.contains("no tools available"));
    }

    #[test]
    fn test_build_system_prompt_custom_system() {
        let custom = "You are a custom assistant.";
        assert_eq!(build_system_prompt(&[], 5, Some(custom)), custom);
        assert!(build_system_prompt(&[], 5, Some("  ")).contains("smart assistant"));
    }
}
