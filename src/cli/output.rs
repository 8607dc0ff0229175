use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Serialized form of `value`, or `None` when the caller prints its own
    /// human-readable rendering.
    pub fn render<T: Serialize>(self, value: &T) -> Result<Option<String>> {
        Ok(match self {
            OutputFormat::Human => None,
            OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn human_output_is_left_to_the_caller() {
        let value = json!({"status": "passed"});
        assert!(OutputFormat::Human.render(&value).unwrap().is_none());
        let rendered = OutputFormat::Json.render(&value).unwrap().unwrap();
        assert!(rendered.contains("\"status\": \"passed\""));
        let rendered = OutputFormat::Yaml.render(&value).unwrap().unwrap();
        assert_eq!(rendered.trim(), "status: passed");
    }
}
