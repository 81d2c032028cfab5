use jsonschema::JSONSchema;
use serde_json::{json, Value};

/// Compiled JSON schema for one structured-output mode.
pub struct PayloadValidator {
    name: &'static str,
    schema: JSONSchema,
}

impl PayloadValidator {
    fn compile(name: &'static str, schema_json: Value) -> Self {
        let schema = JSONSchema::compile(&schema_json).expect("Invalid internal schema");
        Self { name, schema }
    }

    pub fn summary() -> Self {
        let string_list = json!({ "type": "array", "items": { "type": "string" } });
        Self::compile(
            "summary",
            json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "minLength": 1 },
                    "key_points": string_list,
                    "action_items": string_list,
                    "sentiment": { "type": ["string", "number"] },
                    "sentiment_score": { "type": "number" },
                    "urgency_score": { "type": "number" },
                    "complexity_score": { "type": "number" },
                    "confidence_score": { "type": "number" },
                    "category": { "type": "string" },
                    "priority": { "type": "string" },
                    "entities": {
                        "type": "object",
                        "properties": {
                            "people": string_list,
                            "organizations": string_list,
                            "dates": string_list,
                            "locations": string_list
                        }
                    }
                },
                "required": ["summary"]
            }),
        )
    }

    pub fn tasks_and_events() -> Self {
        Self::compile(
            "tasks_and_events",
            json!({
                "type": "object",
                "properties": {
                    "tasks": { "type": "array", "items": { "type": "object" } },
                    "events": { "type": "array", "items": { "type": "object" } }
                },
                "anyOf": [
                    { "required": ["tasks"] },
                    { "required": ["events"] }
                ]
            }),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_valid(&self, payload: &Value) -> bool {
        self.schema.is_valid(payload)
    }

    /// All schema violations, joined for logging.
    pub fn check(&self, payload: &Value) -> Result<(), String> {
        match self.schema.validate(payload) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let problems: Vec<String> = errors
                    .map(|e| format!("{} at '{}'", e, e.instance_path))
                    .collect();
                Err(problems.join("; "))
            }
        }
    }
}

/// Parses a model reply as JSON. Models without a JSON mode often wrap the
/// object in a code fence or a sentence, so the outermost braces are used.
pub fn parse_payload(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&trimmed[start..=end]).map_err(|e| e.to_string())
        }
        _ => Err("reply contains no JSON object".to_string()),
    }
}

/// First `max` characters of a raw payload, for diagnostics.
pub fn truncate_for_log(raw: &str, max: usize) -> String {
    match raw.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}
