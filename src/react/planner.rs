//! Tool Call 解析
//!
//! parse_llm_output 从模型回复中提取 JSON，解析为 ToolCall 或直接回复。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 模型返回的 Tool Call（{"tool": "echo", "args": {"text": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 最终回复
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 解析模型输出：含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    // ```json ... ``` 或裸 JSON
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) if end > start => &trimmed[start..=end],
            _ => return Ok(PlannerOutput::Response(trimmed.to_string())),
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    if parsed.tool.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_call_and_response() {
        let out = parse_llm_output(r#"```json
{"tool": "echo", "args": {"text": "hi"}}
```"#)
        .unwrap();
        assert_eq!(
            out,
            PlannerOutput::ToolCall(ToolCall {
                tool: "echo".into(),
                args: json!({ "text": "hi" }),
            })
        );

        assert_eq!(
            parse_llm_output("  Paris  ").unwrap(),
            PlannerOutput::Response("Paris".into())
        );
        assert!(matches!(
            parse_llm_output("{not json}"),
            Err(AgentError::JsonParseError(_))
        ));
    }
}
