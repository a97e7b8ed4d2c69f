//! Decoding of `multipart/mixed` evaluation responses.

use serde::Serialize;

/// One item of an evaluation result sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalItem {
    /// Server-side type name from `X-Primitive` (e.g. `string`, `unsignedLong`).
    pub primitive: Option<String>,
    pub content_type: Option<String>,
    /// Node path from `X-Path`, for items that are document nodes.
    pub path: Option<String>,
    pub value: String,
}

/// Extract the `boundary` parameter of a multipart content type.
#[must_use]
pub fn boundary(content_type: &str) -> Option<&str> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Decode an evaluation response body.
///
/// Multipart bodies yield one item per part. Any other non-empty body is a
/// single item carrying the response's content type; an empty body is an
/// empty sequence.
#[must_use]
pub fn parse_eval_response(content_type: Option<&str>, body: &str) -> Vec<EvalItem> {
    if let Some(boundary) = content_type.and_then(boundary) {
        return parse_parts(boundary, body);
    }
    if body.is_empty() {
        return Vec::new();
    }
    vec![EvalItem {
        primitive: None,
        content_type: content_type.map(str::to_string),
        path: None,
        value: body.to_string(),
    }]
}

fn parse_parts(boundary: &str, body: &str) -> Vec<EvalItem> {
    let delimiter = format!("--{boundary}");
    let mut items = Vec::new();
    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        let segment = segment
            .strip_prefix("\r\n")
            .or_else(|| segment.strip_prefix('\n'))
            .unwrap_or(segment);
        let (head, content) = match segment.find("\r\n\r\n") {
            Some(index) => (&segment[..index], &segment[index + 4..]),
            None => match segment.find("\n\n") {
                Some(index) => (&segment[..index], &segment[index + 2..]),
                None => (segment, ""),
            },
        };
        let content = content
            .strip_suffix("\r\n")
            .or_else(|| content.strip_suffix('\n'))
            .unwrap_or(content);
        let mut item = EvalItem {
            primitive: None,
            content_type: None,
            path: None,
            value: content.to_string(),
        };
        for line in head.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match name.trim().to_ascii_lowercase().as_str() {
                "content-type" => item.content_type = value,
                "x-primitive" => item.primitive = value,
                "x-path" => item.path = value,
                _ => {}
            }
        }
        items.push(item);
    }
    items
}
