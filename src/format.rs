//! Output formatting for resolved values.

use clap::ValueEnum;
use serde_json::Value;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Render a value for the terminal.
///
/// Strings print bare in JSON mode so shell callers can use them directly.
pub fn render(value: &Value, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => match value {
            Value::String(s) => Ok(s.clone()),
            other => Ok(serde_json::to_string_pretty(other)?),
        },
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?.trim_end().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_json_and_yaml() {
        let value = json!({"server": {"port": 8080}});
        assert_eq!(
            render(&value, OutputFormat::Json).unwrap(),
            "{\n  \"server\": {\n    \"port\": 8080\n  }\n}"
        );
        assert_eq!(
            render(&value, OutputFormat::Yaml).unwrap(),
            "server:\n  port: 8080"
        );
        assert_eq!(render(&json!("plain"), OutputFormat::Json).unwrap(), "plain");
    }
}
