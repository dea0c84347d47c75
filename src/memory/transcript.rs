//! 对话记录（Transcript）
//!
//! 有序 Turn 序列，每个 Turn 含角色与若干 ContentBlock（文本 / 工具请求 / 工具结果）。
//! 单次循环执行内只追加、不重排、不修改已追加的 Turn。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 工具输入：字符串到字符串的映射（BTreeMap 保证序列化顺序稳定）
pub type ToolInput = BTreeMap<String, String>;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 模型请求执行的一次工具调用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

/// 一次工具调用的结果，id 与对应 ToolRequest 相同
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

/// 内容块：每块只有一种标签
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolRequest(ToolRequest),
    ToolResult(ToolResult),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_request(
        id: impl Into<String>,
        name: impl Into<String>,
        input: ToolInput,
    ) -> Self {
        Self::ToolRequest(ToolRequest {
            id: id.into(),
            name: name.into(),
            input,
        })
    }

    pub fn tool_result(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolResult(ToolResult {
            id: id.into(),
            output: output.into(),
            is_error: false,
        })
    }

    /// 错误结果：文本统一加 `Error: ` 前缀，供模型识别并自我纠正
    pub fn tool_error(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ToolResult(ToolResult {
            id: id.into(),
            output: format!("Error: {message}"),
            is_error: true,
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// 单个 Turn：角色 + 有序内容块
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![ContentBlock::text(text)])
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::text(text)])
    }

    /// 第一个文本块（若有）
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    /// 按出现顺序列出工具请求
    pub fn tool_requests(&self) -> Vec<&ToolRequest> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolRequest(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult(res) => Some(res),
                _ => None,
            })
            .collect()
    }
}

/// 对话记录：只追加
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(Turn::user_text(prompt));
        transcript
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_block_serde_tag() {
        let block = ContentBlock::tool_request("1", "get_weather", ToolInput::new());
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_request");
        assert_eq!(json["name"], "get_weather");

        let text: ContentBlock =
            serde_json::from_value(serde_json::json!({"type": "text", "text": "hi"})).unwrap();
        assert_eq!(text.as_text(), Some("hi"));
    }

    #[test]
    fn test_first_text_skips_tool_blocks() {
        let turn = Turn::assistant(vec![
            ContentBlock::tool_request("1", "get_location", ToolInput::new()),
            ContentBlock::text("first"),
            ContentBlock::text("second"),
        ]);
        assert_eq!(turn.first_text(), Some("first"));
        assert_eq!(turn.tool_requests().len(), 1);
    }

    #[test]
    fn test_tool_error_prefix() {
        match ContentBlock::tool_error("7", "boom") {
            ContentBlock::ToolResult(res) => {
                assert!(res.is_error);
                assert_eq!(res.output, "Error: boom");
                assert_eq!(res.id, "7");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }
}
