use mailroom_core::types::ReplyTone;

use crate::provider::{ChatMessage, ChatRequest, ResponseFormat};

const ANALYST_SYSTEM: &str = "You are a helpful email analysis assistant. Always respond with valid JSON.";
const REPLY_SYSTEM: &str = "You are a helpful email assistant.";
const EXTRACTION_SYSTEM: &str =
    "You are a helpful assistant that extracts tasks and events from emails. Always respond with valid JSON.";
const REPAIR_SYSTEM: &str = "You are a JSON repair specialist. Output corrected JSON only.";

pub fn summary_request(content: &str) -> ChatRequest {
    let prompt = format!(
        r#"Analyze the following email and provide a comprehensive summary.

Email Content:
{content}

Respond with a JSON object of this shape:
{{
    "summary": "Brief 2-3 sentence summary of the email",
    "key_points": ["3-5 key points from the email"],
    "action_items": ["Specific actions required"],
    "sentiment": "positive/neutral/negative",
    "sentiment_score": "number from -1.0 to 1.0",
    "urgency_score": "number from 1 to 10",
    "complexity_score": "number from 1 to 10",
    "confidence_score": "number from 0.0 to 1.0",
    "category": "work/personal/promotional/social",
    "priority": "high/medium/low",
    "entities": {{
        "people": ["Names mentioned"],
        "organizations": ["Companies or organizations"],
        "dates": ["Important dates"],
        "locations": ["Places mentioned"]
    }}
}}"#
    );

    ChatRequest {
        messages: vec![ChatMessage::system(ANALYST_SYSTEM), ChatMessage::user(prompt)],
        temperature: 0.3,
        max_tokens: 1000,
        response_format: Some(ResponseFormat::Json),
        model: None,
    }
}

fn tone_instruction(tone: ReplyTone) -> &'static str {
    match tone {
        ReplyTone::Professional => "Write a professional, formal response",
        ReplyTone::Friendly => "Write a warm, friendly response",
        ReplyTone::Brief => "Write a concise, brief response",
    }
}

pub fn reply_request(content: &str, tone: ReplyTone, context: &str) -> ChatRequest {
    let prompt = format!(
        "Generate a {tone} email reply to the following email:\n\n\
         Original Email:\n{content}\n\n\
         Additional Context:\n{context}\n\n\
         Instructions:\n\
         - {instruction}\n\
         - Be helpful and appropriate\n\
         - Include proper greeting and closing\n\
         - Keep it concise but complete\n\
         - Do not include subject line\n\n\
         Reply:",
        instruction = tone_instruction(tone),
    );

    ChatRequest {
        messages: vec![ChatMessage::system(REPLY_SYSTEM), ChatMessage::user(prompt)],
        temperature: 0.7,
        max_tokens: 500,
        response_format: Some(ResponseFormat::Text),
        model: None,
    }
}

pub fn tasks_and_events_request(content: &str) -> ChatRequest {
    let prompt = format!(
        r#"Analyze the following email and extract any tasks, meetings, or events that should be added to a calendar or task list.

Email Content:
{content}

Respond with a JSON object of this shape:
{{
    "tasks": [
        {{
            "title": "Task title",
            "description": "Task description",
            "due_date": "YYYY-MM-DD or null",
            "priority": "high/medium/low",
            "type": "task/followup/deadline"
        }}
    ],
    "events": [
        {{
            "title": "Event title",
            "description": "Event description",
            "start_time": "YYYY-MM-DD HH:MM or null",
            "end_time": "YYYY-MM-DD HH:MM or null",
            "location": "Location or null",
            "attendees": ["email1@example.com"],
            "type": "meeting/call/event"
        }}
    ]
}}

Only extract items that are clearly actionable or scheduled. Return empty arrays if no tasks or events are found."#
    );

    ChatRequest {
        messages: vec![ChatMessage::system(EXTRACTION_SYSTEM), ChatMessage::user(prompt)],
        temperature: 0.3,
        max_tokens: 800,
        response_format: Some(ResponseFormat::Json),
        model: None,
    }
}

/// Second pass for a reply that parsed but failed schema validation.
pub fn repair_request(original: &ChatRequest, invalid: &str, problems: &str) -> ChatRequest {
    let task = original
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let prompt = format!(
        "The previous JSON output does not match the requested structure. Fix it.\n\n\
         Problems: {problems}\n\n\
         Original request:\n{task}\n\n\
         Invalid JSON:\n{invalid}"
    );

    ChatRequest {
        messages: vec![ChatMessage::system(REPAIR_SYSTEM), ChatMessage::user(prompt)],
        temperature: 0.0,
        max_tokens: original.max_tokens,
        response_format: Some(ResponseFormat::Json),
        model: original.model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_prompt_follows_tone() {
        let friendly = reply_request("Hi there", ReplyTone::Friendly, "");
        let prompt = &friendly.messages[1].content;
        assert!(prompt.starts_with("Generate a friendly email reply"));
        assert!(prompt.contains("Write a warm, friendly response"));
        assert_eq!(friendly.max_tokens, 500);
    }

    #[test]
    fn structured_prompts_ask_for_json() {
        let summary = summary_request("Body");
        assert_eq!(summary.response_format, Some(ResponseFormat::Json));
        assert!(summary.messages[0].content.contains("JSON"));

        let items = tasks_and_events_request("Body");
        assert_eq!(items.max_tokens, 800);
        assert!(items.messages[1].content.contains("\"start_time\""));
    }

    #[test]
    fn repair_carries_original_task() {
        let original = summary_request("Quarterly numbers attached");
        let repair = repair_request(&original, "{\"key_points\": 1}", "missing summary");
        let prompt = &repair.messages[1].content;
        assert!(prompt.contains("Quarterly numbers attached"));
        assert!(prompt.contains("missing summary"));
        assert_eq!(repair.max_tokens, original.max_tokens);
    }
}
