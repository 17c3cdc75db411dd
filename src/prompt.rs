use serde::Serialize;

/// Hard cap on the context handed to the model, in characters.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

pub const REFUSAL: &str = "The information is not available in the uploaded files.";

const SYSTEM_INSTRUCTION: &str = "Strictly use uploaded files only.";

/// How the model is asked to embed chart data in its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `<answer>...</answer>` plus `<json>...</json>`.
    #[default]
    Tagged,
    /// A bare JSON object somewhere in the text.
    Bare,
}

impl std::str::FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tagged" => Ok(ResponseFormat::Tagged),
            "bare" | "json" => Ok(ResponseFormat::Bare),
            other => Err(format!("unknown response format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub messages: Vec<Message>,
}

/// First `MAX_CONTEXT_CHARS` characters of the blob.
pub fn truncate_context(blob: &str) -> &str {
    match blob.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((cut, _)) => &blob[..cut],
        None => blob,
    }
}

pub fn build_prompt(format: ResponseFormat, context_blob: &str, question: &str) -> Prompt {
    let context = truncate_context(context_blob);
    if context.len() < context_blob.len() {
        tracing::debug!(
            "Context truncated from {} to {} bytes",
            context_blob.len(),
            context.len()
        );
    }

    match format {
        ResponseFormat::Tagged => Prompt {
            messages: vec![
                Message::new("system", SYSTEM_INSTRUCTION.to_string()),
                Message::new("user", tagged_prompt(context, question)),
            ],
        },
        ResponseFormat::Bare => Prompt {
            messages: vec![Message::new("user", bare_prompt(context, question))],
        },
    }
}

fn tagged_prompt(context: &str, question: &str) -> String {
    format!(
        r#"
You are a financial analysis assistant.
You ONLY use the following extracted file data for answering.
If the answer is not in the data, say:
"{refusal}"

Answer format:
<answer>
[clean explanation]
</answer>

For visualization, include:
<json>
{{ "chart_type": "bar/line/pie/scatter/area", "col1": [...], ... }}
</json>

DATA:
{context}

QUESTION:
{question}
"#,
        refusal = REFUSAL,
        context = context,
        question = question
    )
}

fn bare_prompt(context: &str, question: &str) -> String {
    format!(
        r#"
You are a financial analysis assistant.
You are given data (in text, CSV, or extracted tables) and a user question.
1. Analyze the data carefully.
2. Provide a concise, analytical answer.
3. If relevant, return a JSON summary of key metrics for visualization.
4. Suggest the most suitable chart type in the JSON output as `"chart_type"` (e.g., "bar", "line", "pie", "scatter", "area").

Example JSON format:
{{
  "chart_type": "bar",
  "Years": [2021, 2022, 2023],
  "Revenue": [100, 150, 200],
  "Profit": [20, 30, 45]
}}

Context:
{context}

Question:
{question}
"#,
        context = context,
        question = question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_to_exact_char_count() {
        let blob = "a".repeat(MAX_CONTEXT_CHARS + 500);
        assert_eq!(truncate_context(&blob).chars().count(), MAX_CONTEXT_CHARS);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let blob = "€".repeat(MAX_CONTEXT_CHARS + 1);
        let cut = truncate_context(&blob);
        assert_eq!(cut.chars().count(), MAX_CONTEXT_CHARS);
        assert_eq!(cut.len(), MAX_CONTEXT_CHARS * '€'.len_utf8());
    }

    #[test]
    fn test_short_context_untouched() {
        assert_eq!(truncate_context("short"), "short");
    }

    #[test]
    fn test_tagged_prompt_shape() {
        let prompt = build_prompt(ResponseFormat::Tagged, "DATA BLOB", "What was revenue?");
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, "system");
        assert_eq!(prompt.messages[0].content, SYSTEM_INSTRUCTION);

        let user = &prompt.messages[1].content;
        assert!(user.contains("<answer>"));
        assert!(user.contains("<json>"));
        assert!(user.contains(REFUSAL));
        assert!(user.contains("DATA:\nDATA BLOB"));
        assert!(user.contains("QUESTION:\nWhat was revenue?"));
    }

    #[test]
    fn test_bare_prompt_shape() {
        let prompt = build_prompt(ResponseFormat::Bare, "ctx", "q?");
        assert_eq!(prompt.messages.len(), 1);
        assert_eq!(prompt.messages[0].role, "user");
        assert!(prompt.messages[0].content.contains("\"chart_type\": \"bar\""));
        assert!(prompt.messages[0].content.contains("Context:\nctx"));
    }

    #[test]
    fn test_prompt_embeds_truncated_context() {
        let blob = format!("{}{}", "x".repeat(MAX_CONTEXT_CHARS), "TAIL");
        let prompt = build_prompt(ResponseFormat::Tagged, &blob, "q");
        assert!(!prompt.messages[1].content.contains("TAIL"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Tagged".parse::<ResponseFormat>(), Ok(ResponseFormat::Tagged));
        assert_eq!("bare".parse::<ResponseFormat>(), Ok(ResponseFormat::Bare));
        assert!("xml".parse::<ResponseFormat>().is_err());
    }
}
