//! System prompt for the coding agent.

use std::fmt::Write as _;

use house_rs::agent::SubAgentProfile;

const BASE_PROMPT: &str = "\
You are House Code, a coding assistant. You help with software engineering \
tasks by reading, writing and running code with your tools.

How you work:
1. Understand the request.
2. Gather the context you need with Read, Grep and Glob.
3. Make changes with Edit, Write and Bash.
4. Verify the result, then answer.

Tool rules:
- Read a file before editing it. Edit refuses files you have not read, or \
that changed since you read them.
- Prefer Edit over Write for existing files. old_string must match exactly.
- Use Bash for builds, tests, git and package management.
- Use TodoWrite to track multi-step work. Keep exactly one item in_progress.

Older parts of this conversation may be replaced by lines starting with \
\"[Compacted turns\". They summarize work that is no longer needed verbatim; \
read files again when you need their current content.

Be concise. Show file paths with line numbers when relevant.";

/// The coding system prompt, with a `Task` section listing `profiles`.
/// An empty slice leaves delegation out.
pub fn coding_system_prompt(profiles: &[SubAgentProfile]) -> String {
    let mut prompt = BASE_PROMPT.to_string();
    if profiles.is_empty() {
        return prompt;
    }
    prompt.push_str(
        "\n\nTask tool: delegate broad exploration, long command sequences and \
         history digging to a sub-agent. It works in a separate context and \
         returns one report, which keeps this conversation small. Available \
         sub-agents:\n",
    );
    for profile in profiles {
        let _ = writeln!(prompt, "- {}: {}", profile.name, profile.description);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_each_profile() {
        let prompt = coding_system_prompt(&SubAgentProfile::builtin());
        assert!(prompt.contains("Task tool"));
        for name in ["explore", "research", "bash", "git"] {
            assert!(prompt.contains(&format!("- {name}: ")), "missing {name}");
        }
    }

    #[test]
    fn no_profiles_no_task_section() {
        let prompt = coding_system_prompt(&[]);
        assert!(prompt.starts_with("You are House Code"));
        assert!(!prompt.contains("Task tool"));
    }
}
