//! Pull a single script out of free-form model output.
//!
//! Priority order:
//! 1. first fenced block tagged `python` (or `py` / `python3`)
//! 2. first untagged fenced block that contains the entry marker
//! 3. raw lines from the first line containing the entry marker to the end

use std::sync::OnceLock;

use regex::Regex;

/// Marker every CadQuery script carries.
pub const CADQUERY_ENTRY_MARKER: &str = "import cadquery";

fn tagged_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:python3?|py)[ \t]*\r?\n(.*?)```").expect("static regex is valid")
    })
}

fn generic_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*\r?\n(.*?)```").expect("static regex is valid"))
}

/// Extract a CadQuery script from `response`.
pub fn extract_source(response: &str) -> Option<String> {
    extract_with_marker(response, CADQUERY_ENTRY_MARKER)
}

/// Extract a script, using `marker` to recognise untagged code.
pub fn extract_with_marker(response: &str, marker: &str) -> Option<String> {
    if let Some(caps) = tagged_block().captures(response) {
        let code = caps[1].trim();
        if !code.is_empty() {
            return Some(code.to_string());
        }
    }

    if let Some(caps) = generic_block().captures(response) {
        let code = caps[1].trim();
        if code.contains(marker) {
            return Some(code.to_string());
        }
    }

    let lines: Vec<&str> = response.lines().collect();
    let start = lines.iter().position(|line| line.contains(marker))?;
    Some(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_tagged_block() {
        let text = "Here you go:\n```\nprint('not this')\n```\n```python\nimport cadquery as cq\nresult = cq.Workplane().box(1, 1, 1)\n```\n";
        let code = extract_source(text).unwrap();
        assert!(code.starts_with("import cadquery as cq"));
        assert!(!code.contains("not this"));
    }

    #[test]
    fn test_generic_block_requires_marker() {
        let with_marker = "```\nimport cadquery as cq\nresult = cq.Workplane()\n```";
        assert_eq!(
            extract_source(with_marker).as_deref(),
            Some("import cadquery as cq\nresult = cq.Workplane()")
        );

        let without_marker = "```\necho hello\n```";
        assert_eq!(extract_source(without_marker), None);
    }

    #[test]
    fn test_raw_fallback_collects_to_end() {
        let text = "Sure.\nimport cadquery as cq\nresult = cq.Workplane().box(2, 2, 2)";
        assert_eq!(
            extract_source(text).as_deref(),
            Some("import cadquery as cq\nresult = cq.Workplane().box(2, 2, 2)")
        );
    }

    #[test]
    fn test_not_found() {
        assert_eq!(extract_source("I cannot help with that."), None);
        assert_eq!(extract_source(""), None);
    }

    #[test]
    fn test_empty_tagged_block_falls_through() {
        let text = "```python\n```\nimport cadquery as cq";
        assert_eq!(extract_source(text).as_deref(), Some("import cadquery as cq"));
    }

    #[test]
    fn test_custom_marker() {
        let text = "```\nuse std::io;\n```";
        assert_eq!(extract_with_marker(text, "use std").as_deref(), Some("use std::io;"));
    }

    #[test]
    fn test_deterministic() {
        let text = "```python\nimport cadquery as cq\n```";
        assert_eq!(extract_source(text), extract_source(text));
    }
}
