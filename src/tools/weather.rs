//! 天气演示工具：get_location / get_weather（固定返回值，便于端到端演示）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;

use crate::core::AgentError;
use crate::durable::DurableContext;
use crate::memory::ToolInput;
use crate::tools::{input_schema_for, Tool};

/// 获取用户当前位置
pub struct GetLocationTool;

#[async_trait]
impl Tool for GetLocationTool {
    fn name(&self) -> &str {
        "get_location"
    }

    fn description(&self) -> &str {
        "Get the user's current location."
    }

    async fn execute(&self, _input: &ToolInput, _ctx: &DurableContext) -> Result<String, AgentError> {
        Ok("London, UK".to_string())
    }
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct WeatherInput {
    location: String,
}

/// 查询某地当前天气
pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a location."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<WeatherInput>()
    }

    async fn execute(&self, input: &ToolInput, _ctx: &DurableContext) -> Result<String, AgentError> {
        let location = input
            .get("location")
            .ok_or_else(|| AgentError::InvalidInput("missing 'location'".to_string()))?;
        Ok(format!("The weather in {location} is sunny, 72°F."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::durable::{ContextOptions, MemoryCheckpointStore};

    fn ctx() -> DurableContext {
        DurableContext::new("exec_w", Arc::new(MemoryCheckpointStore::new()), ContextOptions::default())
    }

    #[tokio::test]
    async fn test_weather_tools() {
        let ctx = ctx();
        assert_eq!(
            GetLocationTool.execute(&ToolInput::new(), &ctx).await.unwrap(),
            "London, UK"
        );
        let mut input = ToolInput::new();
        input.insert("location".into(), "London, UK".into());
        assert_eq!(
            GetWeatherTool.execute(&input, &ctx).await.unwrap(),
            "The weather in London, UK is sunny, 72°F."
        );
        assert!(GetWeatherTool.execute(&ToolInput::new(), &ctx).await.is_err());
    }

    #[test]
    fn test_weather_schema_requires_location() {
        let schema = GetWeatherTool.input_schema();
        assert_eq!(schema["required"][0], "location");
    }
}
