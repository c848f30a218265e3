//! Wires the CLI's tool-policy flags (§6: `--allow-non-destructive-tools`,
//! `--auto-approve-tools`, `--disable-tools`, `--disable-all-tools`,
//! `--disable-tool-guardrails`) onto a `ToolRegistry` and `ApprovalGate`.

use lace_tools::{ApprovalGate, Tool, ToolRegistry};

use crate::cli_args::CliArgs;

/// Builds the registry `--disable-tools`/`--disable-all-tools` leave
/// behind. `delegate` is added by the caller once it has a coordinator to
/// wrap, so it is never present here.
pub fn build_registry(args: &CliArgs) -> ToolRegistry {
    if args.disable_all_tools {
        return ToolRegistry::new();
    }
    let mut registry = lace_tools::default_registry();
    for name in &args.disable_tools {
        registry.remove(name.trim());
    }
    registry
}

/// Pre-approves tools in `registry` per the CLI's standing policy flags,
/// so the approval gate never suspends a turn for them. `--auto-approve-tools`
/// and `--disable-tool-guardrails` both pre-approve everything registered;
/// `--allow-non-destructive-tools` pre-approves only tools not explicitly
/// marked destructive.
pub fn apply_approval_policy(args: &CliArgs, registry: &ToolRegistry, gate: &ApprovalGate) {
    let approve_everything = args.auto_approve_tools || args.disable_tool_guardrails;
    if !approve_everything && !args.allow_non_destructive_tools {
        return;
    }
    for name in registry.names() {
        let Some(tool) = registry.find(&name) else { continue };
        let non_destructive = tool.annotations().destructive_hint != Some(true);
        if approve_everything || non_destructive {
            gate.pre_approve(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> CliArgs {
        let mut full = vec!["lace"];
        full.extend_from_slice(args);
        CliArgs::parse_from(full)
    }

    #[test]
    fn disable_all_tools_yields_an_empty_registry() {
        let args = parse(&["--disable-all-tools"]);
        let registry = build_registry(&args);
        assert!(registry.names().is_empty());
    }

    #[test]
    fn disable_tools_removes_only_named_tools() {
        let args = parse(&["--disable-tools", "bash,file_write"]);
        let registry = build_registry(&args);
        let names = registry.names();
        assert!(!names.contains(&"bash".to_string()));
        assert!(!names.contains(&"file_write".to_string()));
        assert!(names.contains(&"file_read".to_string()));
    }

    #[tokio::test]
    async fn auto_approve_tools_pre_approves_destructive_tools_too() {
        let args = parse(&["--auto-approve-tools"]);
        let registry = build_registry(&args);
        let store: std::sync::Arc<dyn lace_core::ThreadStore> =
            std::sync::Arc::new(lace_core::store::InMemoryThreadStore::new());
        let gate = ApprovalGate::new(store);
        apply_approval_policy(&args, &registry, &gate);
        assert!(gate.session_allowed("bash"));
    }

    #[tokio::test]
    async fn allow_non_destructive_tools_skips_destructive_ones() {
        let args = parse(&["--allow-non-destructive-tools"]);
        let registry = build_registry(&args);
        let store: std::sync::Arc<dyn lace_core::ThreadStore> =
            std::sync::Arc::new(lace_core::store::InMemoryThreadStore::new());
        let gate = ApprovalGate::new(store);
        apply_approval_policy(&args, &registry, &gate);
        assert!(gate.session_allowed("file_read"));
        assert!(!gate.session_allowed("bash"));
    }

    #[tokio::test]
    async fn no_policy_flags_pre_approve_nothing() {
        let args = parse(&[]);
        let registry = build_registry(&args);
        let store: std::sync::Arc<dyn lace_core::ThreadStore> =
            std::sync::Arc::new(lace_core::store::InMemoryThreadStore::new());
        let gate = ApprovalGate::new(store);
        apply_approval_policy(&args, &registry, &gate);
        assert!(!gate.session_allowed("file_read"));
        assert!(!gate.session_allowed("bash"));
    }
}
