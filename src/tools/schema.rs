//! 工具输入 JSON Schema 生成（schemars 自动生成，避免手写 schema 与实际字段漂移）

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 由输入结构体派生工具的 input_schema
pub fn input_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct WeatherInput {
        /// 城市名
        location: String,
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = input_schema_for::<WeatherInput>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["location"].is_object());
        assert_eq!(schema["required"][0], "location");
    }
}
