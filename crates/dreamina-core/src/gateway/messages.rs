//! Chat payload normalization.
//!
//! `/v1/chat/completions` accepts the whole OpenAI family of message
//! shapes: plain strings, arrays of typed parts, and loose objects. This
//! module flattens any of them into prompt text plus ordered image inputs.

use serde_json::Value;

use super::image_input::ImageInput;

/// Normalized chat payload.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessages {
    pub text: String,
    pub images: Vec<ImageInput>,
}

impl ParsedMessages {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Canonical single-message form: one user message whose content is a
    /// text part followed by one `image_url` part per image.
    pub fn serialize(&self) -> Vec<Value> {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(serde_json::json!({"type": "text", "text": self.text}));
        }
        for image in &self.images {
            let value = match image {
                ImageInput::Url(url) => url.clone(),
                ImageInput::Base64(data) => format!("data:image/png;base64,{data}"),
                ImageInput::Path(path) => path.clone(),
                ImageInput::Bytes(_) => continue,
            };
            parts.push(serde_json::json!({"type": "image_url", "image_url": {"url": value}}));
        }
        vec![serde_json::json!({"role": "user", "content": parts})]
    }
}

/// Flatten a message list. Texts of consecutive messages join with newlines;
/// images keep their order of appearance.
pub fn parse_messages(messages: &[Value]) -> ParsedMessages {
    let mut parsed = ParsedMessages::default();
    let mut texts: Vec<String> = Vec::new();

    for message in messages {
        // System/assistant turns carry no generation inputs.
        let role = message.get("role").and_then(|v| v.as_str()).unwrap_or("user");
        if role != "user" {
            continue;
        }
        if let Some(content) = message.get("content") {
            collect_content(content, &mut texts, &mut parsed.images);
        }
    }

    parsed.text = texts.join("\n");
    parsed
}

fn collect_content(content: &Value, texts: &mut Vec<String>, images: &mut Vec<ImageInput>) {
    match content {
        Value::String(s) => {
            if !s.trim().is_empty() {
                texts.push(s.trim().to_string());
            }
        }
        Value::Array(parts) => {
            for part in parts {
                collect_part(part, texts, images);
            }
        }
        Value::Object(_) => collect_part(content, texts, images),
        _ => {}
    }
}

fn collect_part(part: &Value, texts: &mut Vec<String>, images: &mut Vec<ImageInput>) {
    let kind = part.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match kind {
        "text" | "input_text" => {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    texts.push(text.trim().to_string());
                }
            }
            return;
        }
        "image_url" | "input_image" | "image" => {
            if let Some(image) = extract_image_value(part) {
                images.push(image);
            }
            return;
        }
        _ => {}
    }

    // Untyped object: pick up whatever keys it carries.
    if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
        if !text.trim().is_empty() {
            texts.push(text.trim().to_string());
        }
    }
    if let Some(image) = extract_image_value(part) {
        images.push(image);
    }
    if let Some(list) = part.get("images").and_then(|v| v.as_array()) {
        for entry in list {
            if let Some(s) = entry.as_str() {
                images.push(ImageInput::classify(s));
            }
        }
    }
}

/// Probe the known image-bearing keys of one part.
fn extract_image_value(part: &Value) -> Option<ImageInput> {
    // `image_url` is either the URL string itself or `{url: …}`.
    if let Some(image_url) = part.get("image_url") {
        if let Some(s) = image_url.as_str() {
            return Some(ImageInput::classify(s));
        }
        if let Some(s) = image_url.get("url").and_then(|v| v.as_str()) {
            return Some(ImageInput::classify(s));
        }
    }
    if let Some(s) = part.get("url").and_then(|v| v.as_str()) {
        return Some(ImageInput::classify(s));
    }
    for key in ["b64_json", "base64", "image_base64", "image_bytes"] {
        if let Some(s) = part.get(key).and_then(|v| v.as_str()) {
            let data = match ImageInput::classify(s) {
                // The key already says base64; trust it over the heuristic.
                ImageInput::Base64(data) => data,
                _ => s.to_string(),
            };
            return Some(ImageInput::Base64(data));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_content() {
        let messages = vec![json!({"role": "user", "content": "a red fox"})];
        let parsed = parse_messages(&messages);
        assert_eq!(parsed.text, "a red fox");
        assert!(!parsed.has_images());
    }

    #[test]
    fn typed_parts_split_text_and_images() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "blend these"},
                {"type": "image_url", "image_url": {"url": "https://x/y.png"}},
                {"type": "input_image", "image_url": "https://x/z.png"},
            ]
        })];
        let parsed = parse_messages(&messages);
        assert_eq!(parsed.text, "blend these");
        assert_eq!(
            parsed.images,
            vec![
                ImageInput::Url("https://x/y.png".to_string()),
                ImageInput::Url("https://x/z.png".to_string()),
            ]
        );
    }

    #[test]
    fn base64_keys_route_to_base64() {
        let messages = vec![json!({
            "role": "user",
            "content": [{"type": "image", "b64_json": "aGVsbG8="}]
        })];
        let parsed = parse_messages(&messages);
        assert_eq!(parsed.images, vec![ImageInput::Base64("aGVsbG8=".to_string())]);
    }

    #[test]
    fn data_uri_in_image_url_is_stripped() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0KGgo="}}
            ]
        })];
        let parsed = parse_messages(&messages);
        assert_eq!(parsed.images, vec![ImageInput::Base64("iVBORw0KGgo=".to_string())]);
    }

    #[test]
    fn non_user_turns_are_ignored() {
        let messages = vec![
            json!({"role": "system", "content": "you are a fox painter"}),
            json!({"role": "user", "content": "paint one"}),
        ];
        let parsed = parse_messages(&messages);
        assert_eq!(parsed.text, "paint one");
    }

    #[test]
    fn parse_serialize_parse_is_stable() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "two foxes"},
                {"type": "image_url", "image_url": {"url": "https://x/a.png"}},
                {"type": "image", "b64_json": "aGVsbG8="},
            ]
        })];
        let first = parse_messages(&messages);
        let second = parse_messages(&first.serialize());
        assert_eq!(first.text, second.text);
        assert_eq!(first.images, second.images);
    }
}
