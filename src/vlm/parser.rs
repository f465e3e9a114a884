//! Deterministic Markdown report parser (§4.5). Never throws; missing
//! fields fall back to defaults.

use regex::Regex;

use crate::types::Severity;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub summary: String,
    pub severity: Severity,
    pub diseases: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f32,
}

impl Default for ParsedReport {
    fn default() -> Self {
        Self {
            summary: String::new(),
            severity: Severity::Medium,
            diseases: Vec::new(),
            recommendations: Vec::new(),
            confidence: 0.75,
        }
    }
}

fn section_body(markdown: &str, heading: &str) -> Option<String> {
    let heading_lower = heading.to_lowercase();
    let mut lines = markdown.lines().peekable();
    while let Some(line) = lines.next() {
        let stripped = line.trim_start_matches('#').trim().to_lowercase();
        if stripped.contains(&heading_lower) && line.trim_start().starts_with('#') {
            let mut body = String::new();
            for next in lines.by_ref() {
                if next.trim_start().starts_with('#') {
                    break;
                }
                body.push_str(next);
                body.push('\n');
            }
            return Some(body);
        }
    }
    None
}

fn first_section_body(markdown: &str) -> String {
    section_body(markdown, "summary")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn parse_severity(markdown: &str) -> Severity {
    let Some(body) = section_body(markdown, "severity") else {
        return Severity::Medium;
    };
    let lower = body.to_lowercase();
    if lower.contains('高') || lower.contains("high") {
        Severity::High
    } else if lower.contains('低') || lower.contains("low") {
        Severity::Low
    } else if lower.contains('中') || lower.contains("medium") {
        Severity::Medium
    } else {
        Severity::Medium
    }
}

fn parse_list_items(body: &str) -> Vec<String> {
    let bullet_re = Regex::new(r"^\s*(?:[-*]|\d+[.)])\s*(.+)$").expect("static regex is valid");
    let mut items: Vec<String> = body
        .lines()
        .filter_map(|line| bullet_re.captures(line).map(|c| c[1].trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        items = body
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    items
}

fn parse_diseases(markdown: &str) -> Vec<String> {
    section_body(markdown, "disease identification")
        .map(|body| parse_list_items(&body))
        .unwrap_or_default()
}

fn parse_recommendations(markdown: &str) -> Vec<String> {
    section_body(markdown, "immediate")
        .map(|body| parse_list_items(&body))
        .unwrap_or_default()
}

fn parse_confidence(markdown: &str) -> f32 {
    let re = Regex::new(r"(\d{1,3})\s*%").expect("static regex is valid");
    re.captures(markdown)
        .and_then(|c| c[1].parse::<f32>().ok())
        .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
        .unwrap_or(0.75)
}

/// Parse a diagnosis Markdown report into its structured fields. Never
/// panics; any unparseable field falls back to its default.
pub fn parse_report(markdown: &str) -> ParsedReport {
    ParsedReport {
        summary: first_section_body(markdown),
        severity: parse_severity(markdown),
        diseases: parse_diseases(markdown),
        recommendations: parse_recommendations(markdown),
        confidence: parse_confidence(markdown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
## Summary
Leaf shows early blight symptoms.

## Disease identification
- Early blight
- Leaf spot

## Severity
Level: high, confidence 82%, scope: localized

## Detailed analysis
### Features
Brown concentric rings.

## Recommended actions
### Immediate
1. Remove affected leaves
2. Apply fungicide

### Follow-up
Monitor weekly.

## Preventive measures
Improve airflow.
";

    #[test]
    fn parses_well_formed_report() {
        let parsed = parse_report(SAMPLE);
        assert!(parsed.summary.contains("early blight"));
        assert_eq!(parsed.severity, Severity::High);
        assert_eq!(parsed.diseases, vec!["Early blight", "Leaf spot"]);
        assert_eq!(parsed.recommendations, vec!["Remove affected leaves", "Apply fungicide"]);
        assert!((parsed.confidence - 0.82).abs() < 1e-6);
    }

    #[test]
    fn never_panics_on_empty_input() {
        let parsed = parse_report("");
        assert_eq!(parsed, ParsedReport::default());
    }

    #[test]
    fn never_panics_on_garbage_input() {
        let parsed = parse_report("not even markdown at all, just noise %%% ## ###");
        assert!(parsed.confidence >= 0.0 && parsed.confidence <= 1.0);
    }
}
