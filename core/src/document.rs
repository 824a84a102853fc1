/// Tool document codec
///
/// Encodes an (already annotated) tool as a vector-store document. The id is
/// a content hash, so re-discovering an unchanged tool produces the same
/// document and inserts stay idempotent across restarts.
use crate::mcp::Tool;
use crate::vector::Document;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write;

pub fn tool_to_document(tool: &Tool, server_id: &str) -> Document {
    Document {
        id: document_id(tool, server_id),
        content: search_content(tool),
        metadata: metadata(tool, server_id),
        embedding: Vec::new(),
    }
}

fn document_id(tool: &Tool, server_id: &str) -> String {
    let mut data = format!(
        "{}|{}|{}",
        server_id,
        tool.name,
        tool.description.as_deref().unwrap_or_default()
    );

    if let Ok(schema) = serde_json::to_string(&tool.input_schema) {
        data.push('|');
        data.push_str(&schema);
    }

    let hash = Sha256::digest(data.as_bytes());

    let mut id = String::from("tool_");
    for byte in &hash[..12] {
        let _ = write!(id, "{byte:02x}");
    }

    id
}

fn search_content(tool: &Tool) -> String {
    let mut parts = vec![tool.name.as_str()];

    if let Some(description) = tool.description.as_deref() {
        if !description.is_empty() {
            parts.push(description);
        }
    }

    if let Some(title) = tool.annotations.as_ref().and_then(|a| a.title.as_deref()) {
        if !title.is_empty() {
            parts.push(title);
        }
    }

    parts.join(" ")
}

fn metadata(tool: &Tool, server_id: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::from([
        ("server_id".to_string(), server_id.to_string()),
        ("tool_name".to_string(), tool.name.clone()),
        (
            "description".to_string(),
            tool.description.clone().unwrap_or_default(),
        ),
    ]);

    if let Ok(tool_json) = serde_json::to_string(tool) {
        metadata.insert("tool_json".to_string(), tool_json);
    }

    metadata
}
