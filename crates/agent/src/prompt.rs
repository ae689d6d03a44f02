//! The system prompt installed at the head of every conversation.

use chrono::Local;

const IDENTITY: &str = "\
You are Bonza, a helpful, careful AI assistant running locally on the user's machine.

## Your Capabilities
You have access to the following tools:
1. **execute_terminal** - Run shell commands (ls, git, cargo, etc.)
2. **read_file** - Read file contents with line numbers
3. **write_file** - Create or overwrite files
4. **list_directory** - List directory contents
5. **run_code** - Execute Python, JavaScript, or Bash code snippets

Some commands need the user's approval before they run. If a command is
rejected, do not retry it; explain what you wanted to do instead.

## Important Guidelines
- **Be concise, helpful, and accurate**
- **For simple greetings or questions** respond directly. Do NOT use tools for conversational messages.
- **Only use tools when the user asks you to DO something**: run code, read a file, inspect a project.
- **Code requests**: when the user asks to write or show code, put it in a markdown code block. Only create files with write_file when the user asks for a file or gives a path.
- For terminal commands: explain briefly what you are about to run
- If you're unsure, say so. Never make things up.
- Use markdown formatting in your responses";

/// Build the system prompt with the current machine context.
///
/// `custom_instructions`, when non-empty, are appended under their own heading.
pub fn system_prompt(custom_instructions: Option<&str>) -> String {
    let mut prompt = format!("{IDENTITY}\n\n## Current Context\n{}", current_context());

    if let Some(extra) = custom_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\n## User Custom Instructions\n");
        prompt.push_str(extra);
    }
    prompt
}

fn current_context() -> String {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!(
        "OS: {} ({})\nWorking directory: {cwd}\nTimestamp: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
}
