//! `ToolRegistry` (§4.D): name -> Tool mapping, read-mostly after
//! construction and safe for concurrent reads.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Tool;

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// A copy of this registry with `name` removed. Used by the
    /// `DelegateCoordinator` to build a child tool set with `delegate`
    /// stripped out (§4.J, §9: "cheapest safeguard against unbounded
    /// recursion").
    pub fn without(&self, name: &str) -> ToolRegistry {
        let mut clone = self.clone();
        clone.remove(name);
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Tool, ToolContext};
    use crate::error::ToolError;
    use async_trait::async_trait;
    use lace_core::ContentBlock;

    struct NoopTool(&'static str);

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "noop"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute_validated(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<Vec<ContentBlock>, ToolError> {
            Ok(vec![ContentBlock::text("ok")])
        }
    }

    #[test]
    fn without_strips_named_tool_only() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NoopTool("bash")));
        registry.register(Arc::new(NoopTool("delegate")));
        let child = registry.without("delegate");
        assert!(child.find("bash").is_some());
        assert!(child.find("delegate").is_none());
        // original registry is untouched
        assert!(registry.find("delegate").is_some());
    }
}
