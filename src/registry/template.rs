//! URI template matching with placeholder extraction.

use std::collections::HashMap;

/// One segment of a parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Must match the concrete URI segment exactly.
    Literal(String),
    /// Matches any non-empty segment and captures it under the given name.
    Placeholder(String),
}

/// A parsed URI template such as `test://dynamic/resource/{id}`.
///
/// Matching is an explicit structural comparison segment by segment; placeholder
/// values are extracted without any regex machinery.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = template
            .split('/')
            .map(|part| {
                if part.len() >= 2 && part.starts_with('{') && part.ends_with('}') {
                    Segment::Placeholder(part[1..part.len() - 1].to_string())
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();

        Self {
            raw: template.to_string(),
            segments,
        }
    }

    /// The template string as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete URI against this template.
    ///
    /// Returns the extracted placeholder bindings on success, `None` when the
    /// URI does not conform to the template's literal/placeholder structure.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = uri.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Placeholder(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(params)
    }
}
