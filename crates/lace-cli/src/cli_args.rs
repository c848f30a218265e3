//! Parsed CLI surface (§6). Argument parsing is an external collaborator
//! of the conversation-engine core; this struct is `lace-cli`'s own typed
//! boundary, translated into `lace_agent::RunnerOptions` in `main.rs`.
//!
//! Grounded on the teacher's `cli/src/cli_args.rs` `CliArgs` shape: one
//! flat `clap::Parser` struct, an optional positional prompt, long-only
//! policy flags.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "lace",
    about = "Interactive coding assistant conversation engine",
    version
)]
pub struct CliArgs {
    /// The prompt to send. If omitted, reads nothing and exits (the
    /// interactive terminal UI that would normally take over here is an
    /// external collaborator, out of scope for this core).
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model provider name (e.g. "anthropic", "openai", "echo").
    #[arg(long)]
    pub provider: Option<String>,

    /// Model id, or a `provider:model` spec passed straight through.
    #[arg(long)]
    pub model: Option<String>,

    /// Resume a thread. Bare flag resumes the most recently written one;
    /// `--continue <id>` resumes a specific thread id.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub r#continue: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Where to write a HAR-format capture of provider HTTP traffic.
    /// Consumed only by a concrete vendor adapter; this build logs a
    /// notice and otherwise ignores it, since no such adapter is linked in.
    #[arg(long)]
    pub har_file: Option<std::path::PathBuf>,

    /// Treat every tool not explicitly marked destructive as pre-approved
    /// for the session.
    #[arg(long)]
    pub allow_non_destructive_tools: bool,

    /// Treat every registered tool, destructive or not, as pre-approved
    /// for the session.
    #[arg(long)]
    pub auto_approve_tools: bool,

    /// Comma-separated list of tool names to omit from the registry
    /// entirely. May be repeated.
    #[arg(long, value_delimiter = ',')]
    pub disable_tools: Vec<String>,

    /// Register no tools at all.
    #[arg(long)]
    pub disable_all_tools: bool,

    /// Synonym for `--auto-approve-tools` that also skips the
    /// schema-validation-error-as-failed-result ceremony's log line; kept
    /// distinct in the CLI surface because the two flags are documented
    /// separately, but implemented the same way underneath.
    #[arg(long)]
    pub disable_tool_guardrails: bool,

    /// Print the registered tool set (name, description, annotations) and
    /// exit without starting an agent.
    #[arg(long)]
    pub list_tools: bool,
}

impl CliArgs {
    /// `--continue` with no value at all means "no resume"; a bare
    /// `--continue` (empty string, via `default_missing_value`) means
    /// "resume the latest thread"; `--continue <id>` resumes that id.
    pub fn continue_request(&self) -> Option<Option<String>> {
        self.r#continue.as_ref().map(|value| {
            if value.is_empty() {
                None
            } else {
                Some(value.clone())
            }
        })
    }
}

impl From<&CliArgs> for lace_agent::RunnerOptions {
    fn from(args: &CliArgs) -> Self {
        lace_agent::RunnerOptions {
            provider: args.provider.clone(),
            model: args.model.clone(),
            prompt: args.prompt.clone(),
            continue_thread: args.continue_request(),
            log_level: Some(args.log_level.clone()),
            log_file: args.log_file.clone(),
            har_file: args.har_file.clone(),
            allow_non_destructive_tools: args.allow_non_destructive_tools,
            auto_approve_tools: args.auto_approve_tools,
            disable_tools: args.disable_tools.clone(),
            disable_all_tools: args.disable_all_tools,
            disable_tool_guardrails: args.disable_tool_guardrails,
            list_tools: args.list_tools,
        }
    }
}
