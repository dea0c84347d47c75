//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册顺序即 describe_all 的输出顺序：同一次执行内每轮给模型看到的工具目录保持一致，
//! 重放时已记录的推理响应仍然有效。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::durable::DurableContext;
use crate::memory::ToolInput;

/// 工具描述符：名称（注册表内唯一）、描述、输入 JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 工具 trait：只拿到自己的输入与执行上下文，看不到整段对话
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型请求中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 输入 JSON Schema；默认无参数
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// 执行工具。ctx 是该次调用独占的子上下文，可在其中 step 或 wait_for_callback
    async fn execute(&self, input: &ToolInput, ctx: &DurableContext) -> Result<String, AgentError>;
}

/// 工具注册表：保持注册顺序，按名称索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名已存在返回 DuplicateName
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// 按名查找；不存在返回 UnknownTool
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// 工具目录（注册顺序）
    pub fn describe_all(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        async fn execute(&self, _input: &ToolInput, _ctx: &DurableContext) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("a")).unwrap();
        assert_eq!(
            registry.register(Named("a")),
            Err(AgentError::DuplicateName("a".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(AgentError::UnknownTool(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_describe_all_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Named(name)).unwrap();
        }
        let names: Vec<String> = registry.describe_all().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.describe_all(), registry.describe_all());
    }
}
