//! Assembler answer parsing

use roster_core::{Result, RosterError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawAssembly {
    #[serde(default)]
    prompt: String,
}

/// Extract the behavior prompt from an assembler answer `{prompt}`
pub fn parse_assembly(answer: &Value) -> Result<String> {
    let raw: RawAssembly = serde_json::from_value(answer.clone())
        .map_err(|e| RosterError::Assembly(format!("answer does not match the schema: {}", e)))?;

    let prompt = raw.prompt.trim();
    if prompt.is_empty() {
        return Err(RosterError::Assembly(
            "the agent prompt must not be empty".to_string(),
        ));
    }
    Ok(prompt.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assembly() {
        let prompt = parse_assembly(&json!({"prompt": "  Every morning, read stock.  "})).unwrap();
        assert_eq!(prompt, "Every morning, read stock.");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        assert!(parse_assembly(&json!({"prompt": " "})).is_err());
        assert!(parse_assembly(&json!({})).is_err());
        assert!(parse_assembly(&json!(["prompt"])).is_err());
    }
}
