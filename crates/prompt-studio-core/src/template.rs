//! Deterministic analysis of an expected-output template.
//!
//! Placeholders are `{name}` tokens. Each one gets a semantic type from
//! keyword matching on its name, and the template as a whole gets a
//! structure type. The result seeds query design and prompt assembly.

use crate::models::{
    ExpectedOutput, PlaceholderType, StructureType, TemplateAnalysis, TemplatePlaceholder,
};

/// Keyword table checked in order; the first hit wins.
const TYPE_KEYWORDS: &[(PlaceholderType, &[&str])] = &[
    (PlaceholderType::Date, &["date", "time", "year", "month", "day"]),
    (PlaceholderType::List, &["list", "items", "features", "options"]),
    (
        PlaceholderType::Number,
        &["count", "number", "amount", "quantity", "price", "cost"],
    ),
    (
        PlaceholderType::Text,
        &["description", "summary", "details", "text"],
    ),
];

/// Analyze a template and its declared output format.
pub fn analyze_template(expected: &ExpectedOutput) -> TemplateAnalysis {
    let placeholders: Vec<TemplatePlaceholder> = extract_placeholders(&expected.template)
        .into_iter()
        .map(|name| TemplatePlaceholder {
            detected_type: infer_type(name),
            name: name.to_string(),
        })
        .collect();

    let structure_type = detect_structure(&expected.template, expected.output_format);

    let information_requirements = placeholders
        .iter()
        .map(|p| {
            format!(
                "Need to find: {} ({})",
                p.name.replace('_', " "),
                p.detected_type
            )
        })
        .collect();

    let suggested_queries = suggest_queries(&placeholders, expected.description.as_deref());

    TemplateAnalysis {
        placeholders,
        structure_type,
        information_requirements,
        suggested_queries,
    }
}

/// Collect `{name}` tokens in order of appearance. Duplicates are kept.
///
/// A `{` starts a token; the token ends at the next `}` and must be
/// non-empty. Nested braces are not supported: `{a{b}` yields `a{b`.
pub fn extract_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(0) => rest = &after[1..],
            Some(close) => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }

    names
}

/// Infer a placeholder's semantic type from its name.
pub fn infer_type(name: &str) -> PlaceholderType {
    let lower = name.to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(t, _)| *t)
        .unwrap_or(PlaceholderType::String)
}

/// Decide the template's structure type.
///
/// An explicit non-`text` format wins. Otherwise the template text is
/// inspected: brace-delimited → json, pipe plus hyphen → table, more than
/// two `-` or `•` bullet lines → list.
pub fn detect_structure(template: &str, declared: StructureType) -> StructureType {
    if declared != StructureType::Text {
        return declared;
    }

    let trimmed = template.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return StructureType::Json;
    }
    if template.contains('|') && template.contains('-') {
        return StructureType::Table;
    }
    if template.matches("\n-").count() > 2 || template.matches("\n•").count() > 2 {
        return StructureType::List;
    }

    StructureType::Text
}

fn suggest_queries(placeholders: &[TemplatePlaceholder], description: Option<&str>) -> Vec<String> {
    let mut queries = Vec::new();

    if !placeholders.is_empty() {
        let names: Vec<String> = placeholders
            .iter()
            .take(3)
            .map(|p| p.name.replace('_', " "))
            .collect();
        queries.push(format!("What are the {}?", names.join(", ")));
    }

    if let Some(desc) = description.filter(|d| !d.trim().is_empty()) {
        queries.push(desc.to_string());
    }

    queries
}
