//! Structured extraction of a door schedule from retrieved document text.

use serde::{Deserialize, Serialize};

use crate::answer::build_context_block;
use crate::error::{ExtractionError, LlmError};
use crate::llm::Generator;
use crate::models::ChatMessage;
use crate::search::hybrid::HybridRetriever;

const DOOR_SCHEDULE_QUERY: &str = "door schedule door list door types";

/// Where an extracted value was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub file: Option<String>,
    pub page: Option<serde_json::Value>,
    pub chunk: Option<serde_json::Value>,
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One row of a door schedule. Dimensions are millimetres, or a
/// `"a / b"` string when the documents disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorEntry {
    pub mark: Option<String>,
    pub location: Option<String>,
    pub width_mm: Option<serde_json::Value>,
    pub height_mm: Option<serde_json::Value>,
    pub fire_rating: Option<String>,
    pub material: Option<String>,
    #[serde(default)]
    pub source_references: Vec<SourceReference>,
}

fn extraction_prompt(context: &str) -> String {
    format!(
        "You are extracting a door schedule from retrieved document chunks.\n\
         Output a JSON array of door objects with exactly these keys: mark, location, \
         width_mm, height_mm, fire_rating, material, source_references \
         (an array of {{file, page, chunk, excerpt}}).\n\
         Rules:\n\
         - Output valid JSON only, with no commentary.\n\
         - Set missing fields to null.\n\
         - Convert numeric dimensions to integer millimetres.\n\
         - For conflicting values, give both candidates separated by ' / ' and add a note \
         inside source_references.\n\n\
         {context}"
    )
}

/// Extract the door schedule visible in `scope_id`.
///
/// Provider failures propagate. Output that is not a JSON array of doors is
/// logged and yields an empty schedule.
pub async fn extract_door_schedule(
    retriever: &HybridRetriever,
    generator: &dyn Generator,
    scope_id: Option<i64>,
    k: usize,
) -> Result<Vec<DoorEntry>, LlmError> {
    let sources = retriever.search(DOOR_SCHEDULE_QUERY, k, scope_id).await;
    if sources.is_empty() {
        tracing::info!("No chunks available for door schedule extraction (scope {scope_id:?})");
    }

    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: extraction_prompt(&build_context_block(&sources)),
    }];
    let output = generator.complete(&messages).await?;

    match parse_door_schedule(&output) {
        Ok(doors) => {
            tracing::info!("Extracted {} doors from {} chunks", doors.len(), sources.len());
            Ok(doors)
        }
        Err(e) => {
            tracing::warn!("{e}");
            Ok(Vec::new())
        }
    }
}

pub fn parse_door_schedule(output: &str) -> Result<Vec<DoorEntry>, ExtractionError> {
    serde_json::from_str(strip_code_fence(output))
        .map_err(|e| ExtractionError::Malformed(e.to_string()))
}

/// Body of the first markdown code fence, or the trimmed input when unfenced.
fn strip_code_fence(text: &str) -> &str {
    let body = if let Some((_, rest)) = text.split_once("```json") {
        rest
    } else if let Some((_, rest)) = text.split_once("```") {
        rest
    } else {
        return text.trim();
    };
    body.split("```").next().unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{EmbedTask, Embedder, TextStream};
    use crate::search::vector::VectorIndex;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoEmbeddings;

    #[async_trait]
    impl Embedder for NoEmbeddings {
        async fn embed(&self, _texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Upstream("offline".into()))
        }
    }

    struct Reply(&'static str);

    #[async_trait]
    impl Generator for Reply {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        async fn stream(&self, _messages: &[ChatMessage]) -> Result<TextStream, LlmError> {
            Err(LlmError::Upstream("not used".into()))
        }
    }

    fn retriever() -> HybridRetriever {
        HybridRetriever::new(Arc::new(VectorIndex::in_memory(2, Arc::new(NoEmbeddings))))
    }

    const DOORS: &str = r#"[{"mark":"D-101","location":"Lobby","width_mm":900,"height_mm":2100,
        "fire_rating":"1 hr","material":"Hollow metal",
        "source_references":[{"file":"doors.pdf","page":1,"chunk":0,"excerpt":"D-101 900x2100"}]}]"#;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("Here:\n```\n[2]\n```\nDone"), "[2]");
        assert_eq!(strip_code_fence("  [3] "), "[3]");
    }

    #[test]
    fn test_parse_door_schedule() {
        let doors = parse_door_schedule(&format!("```json\n{DOORS}\n```")).unwrap();
        assert_eq!(doors.len(), 1);
        assert_eq!(doors[0].mark.as_deref(), Some("D-101"));
        assert_eq!(doors[0].width_mm, Some(serde_json::json!(900)));
        assert_eq!(doors[0].source_references[0].file.as_deref(), Some("doors.pdf"));
    }

    #[test]
    fn test_conflicting_values_and_nulls() {
        let raw = r#"[{"mark":"D-102","location":null,"width_mm":"900 / 1000","height_mm":null,
            "fire_rating":null,"material":null,"source_references":[]}]"#;
        let doors = parse_door_schedule(raw).unwrap();
        assert_eq!(doors[0].width_mm, Some(serde_json::json!("900 / 1000")));
        assert!(doors[0].location.is_none());
    }

    #[test]
    fn test_prose_is_malformed() {
        assert!(matches!(
            parse_door_schedule("I could not find any doors."),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_returns_parsed_doors() {
        let doors = extract_door_schedule(&retriever(), &Reply(DOORS), None, 15).await.unwrap();
        assert_eq!(doors.len(), 1);
        assert_eq!(doors[0].material.as_deref(), Some("Hollow metal"));
    }

    #[tokio::test]
    async fn test_malformed_output_recovers_to_empty() {
        let doors = extract_door_schedule(&retriever(), &Reply("not json"), None, 15).await.unwrap();
        assert!(doors.is_empty());
    }
}
