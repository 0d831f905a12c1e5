//! Text-analysis heuristics for task estimation.
//!
//! Base hours scale with word count (100 words ≈ 1 hour), adjusted by a
//! weighted keyword table and the number of technical terms, clamped to
//! [1, 24] hours. Capabilities are inferred from a keyword map; confidence
//! grows with text length up to 0.8.

use gantry_core::{AgentCapability, EstimationSource, Task, TaskEstimate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Complexity-indicator keywords and their weights.
const COMPLEXITY_KEYWORDS: [(&str, f64); 14] = [
    ("must", 1.0),
    ("should", 2.0),
    ("could", 3.0),
    ("would", 4.0),
    ("implement", 2.0),
    ("create", 2.0),
    ("build", 3.0),
    ("develop", 3.0),
    ("design", 4.0),
    ("architect", 5.0),
    ("integrate", 4.0),
    ("deploy", 3.0),
    ("test", 2.0),
    ("document", 1.0),
];

static TECHNICAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(API|database|authentication|encryption|scalability|performance",
        r"|security|deployment|integration|microservice|container|kubernetes",
        r"|docker|aws|azure|gcp|cloud|serverless)\b",
    ))
    .unwrap_or_else(|e| panic!("technical term regex: {e}"))
});

/// Keyword -> capability inference map, checked as substrings of the
/// lowercased text.
const CAPABILITY_KEYWORDS: [(&str, AgentCapability); 28] = [
    // Planning & Architecture
    ("design", AgentCapability::SystemDesign),
    ("architecture", AgentCapability::ArchitecturePlanning),
    ("plan", AgentCapability::ArchitecturePlanning),
    ("requirement", AgentCapability::RequirementsAnalysis),
    ("analyze", AgentCapability::RequirementsAnalysis),
    ("break down", AgentCapability::TaskDecomposition),
    ("decompose", AgentCapability::TaskDecomposition),
    // Implementation
    ("implement", AgentCapability::CodeGeneration),
    ("create", AgentCapability::CodeGeneration),
    ("build", AgentCapability::CodeGeneration),
    ("develop", AgentCapability::CodeGeneration),
    ("write", AgentCapability::CodeGeneration),
    ("code", AgentCapability::CodeGeneration),
    ("test", AgentCapability::TestGeneration),
    ("document", AgentCapability::Documentation),
    ("refactor", AgentCapability::Refactoring),
    // Quality Assurance
    ("review", AgentCapability::CodeReview),
    ("audit", AgentCapability::SecurityAudit),
    ("security", AgentCapability::SecurityAudit),
    ("performance", AgentCapability::PerformanceAnalysis),
    ("compliance", AgentCapability::ComplianceCheck),
    // Problem Solving
    ("debug", AgentCapability::Debugging),
    ("fix", AgentCapability::Debugging),
    ("troubleshoot", AgentCapability::Troubleshooting),
    ("diagnose", AgentCapability::RootCauseAnalysis),
    ("optimize", AgentCapability::Optimization),
    // Integration & Operations
    ("deploy", AgentCapability::Deployment),
    ("monitor", AgentCapability::Monitoring),
];

/// Structured result of a text complexity analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnalysis {
    pub word_count: usize,
    pub sentence_count: usize,
    pub technical_terms: usize,
    pub complexity_score: f64,
    pub estimated_hours: f64,
}

/// Analyze requirements text for complexity indicators.
pub fn analyze_requirements_text(text: &str) -> TextAnalysis {
    if text.trim().is_empty() {
        return TextAnalysis {
            word_count: 0,
            sentence_count: 0,
            technical_terms: 0,
            complexity_score: 1.0,
            estimated_hours: 1.0,
        };
    }

    let word_count = text.split_whitespace().count();
    let sentence_count = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let technical_terms = TECHNICAL_TERMS.find_iter(text).count();

    let lower = text.to_lowercase();
    let mut complexity_score = 1.0;
    for (keyword, weight) in COMPLEXITY_KEYWORDS {
        if lower.contains(keyword) {
            complexity_score += weight * 0.1;
        }
    }
    complexity_score += technical_terms as f64 * 0.2;

    let base_hours = word_count as f64 / 100.0;
    let estimated_hours = (base_hours * complexity_score).clamp(1.0, 24.0);

    TextAnalysis {
        word_count,
        sentence_count,
        technical_terms,
        complexity_score,
        estimated_hours,
    }
}

/// Infer required capabilities from free text; defaults to code generation
/// when nothing matches.
pub fn infer_capabilities(text: &str) -> Vec<AgentCapability> {
    let lower = text.to_lowercase();
    let mut capabilities = Vec::new();
    for (keyword, capability) in CAPABILITY_KEYWORDS {
        if lower.contains(keyword) && !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }
    if capabilities.is_empty() {
        capabilities.push(AgentCapability::CodeGeneration);
    }
    capabilities
}

/// Build a PERT estimate from a task's description.
///
/// The O/M/P spread widens for rough mid-range estimates and tightens as
/// the point estimate grows; descriptions of 8+ hours are pinned to the
/// 6/8/12 bracket.
pub fn estimate_from_task_description(task: &Task) -> TaskEstimate {
    let Some(description) = task.description.as_deref().filter(|d| !d.trim().is_empty())
    else {
        return TaskEstimate {
            likely_hours: 2.0,
            confidence: 0.3,
            required_capabilities: vec![AgentCapability::CodeGeneration],
            source: EstimationSource::Default,
            ..Default::default()
        };
    };

    let analysis = analyze_requirements_text(description);
    let hours = analysis.estimated_hours;

    let (optimistic, likely, pessimistic) = if hours < 0.25 {
        (0.1, 0.25, 0.5)
    } else if hours < 1.0 {
        (hours * 0.5, hours, hours * 2.0)
    } else if hours < 4.0 {
        (hours * 0.7, hours, hours * 1.5)
    } else if hours < 8.0 {
        (hours * 0.8, hours, hours * 1.3)
    } else {
        (6.0, 8.0, 12.0)
    };

    let confidence = (0.3 + analysis.word_count as f64 / 500.0).min(0.8);

    TaskEstimate {
        optimistic_hours: optimistic,
        likely_hours: likely,
        pessimistic_hours: pessimistic,
        estimated_tokens: Some(analysis.word_count as u64 * 2),
        estimated_cost_usd: None,
        required_capabilities: infer_capabilities(description),
        confidence,
        last_estimated_at: None,
        source: EstimationSource::AiAnalysis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, SessionId, TenantId};

    fn task_with_description(description: &str) -> Task {
        Task::new(TenantId::now_v7(), SessionId::now_v7(), "Implement feature")
            .expect("task")
            .with_description(description)
    }

    #[test]
    fn test_empty_text_defaults() {
        let analysis = analyze_requirements_text("");
        assert_eq!(analysis.word_count, 0);
        assert_eq!(analysis.estimated_hours, 1.0);
    }

    #[test]
    fn test_hours_clamped() {
        let short = analyze_requirements_text("fix typo");
        assert!(short.estimated_hours >= 1.0);

        let long = "implement design build develop architect integrate deploy "
            .repeat(200);
        let analysis = analyze_requirements_text(&long);
        assert!(analysis.estimated_hours <= 24.0);
    }

    #[test]
    fn test_technical_terms_raise_complexity() {
        let plain = analyze_requirements_text("change the label text on the form");
        let technical = analyze_requirements_text(
            "change the API authentication and database encryption for kubernetes",
        );
        assert!(technical.complexity_score > plain.complexity_score);
        assert!(technical.technical_terms >= 4);
    }

    #[test]
    fn test_capability_inference() {
        let caps = infer_capabilities("Review the security audit findings and fix the bug");
        assert!(caps.contains(&AgentCapability::CodeReview));
        assert!(caps.contains(&AgentCapability::SecurityAudit));
        assert!(caps.contains(&AgentCapability::Debugging));
    }

    #[test]
    fn test_capability_inference_default() {
        assert_eq!(
            infer_capabilities("lorem ipsum dolor"),
            vec![AgentCapability::CodeGeneration]
        );
    }

    #[test]
    fn test_estimate_without_description() {
        let task = Task::new(TenantId::now_v7(), SessionId::now_v7(), "Implement feature")
            .expect("task");
        let estimate = estimate_from_task_description(&task);
        assert_eq!(estimate.likely_hours, 2.0);
        assert_eq!(estimate.source, EstimationSource::Default);
        assert!((estimate.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_confidence_grows_with_length() {
        let short = estimate_from_task_description(&task_with_description(
            "implement the parser",
        ));
        let long_text = "implement the parser with full error recovery ".repeat(30);
        let long = estimate_from_task_description(&task_with_description(&long_text));
        assert!(long.confidence > short.confidence);
        assert!(long.confidence <= 0.8);
        assert_eq!(long.source, EstimationSource::AiAnalysis);
    }

    #[test]
    fn test_estimate_brackets() {
        let task = task_with_description(
            "implement build develop design architect integrate the distributed \
             microservice API with database authentication security deployment",
        );
        let estimate = estimate_from_task_description(&task);
        assert!(estimate.optimistic_hours <= estimate.likely_hours);
        assert!(estimate.likely_hours <= estimate.pessimistic_hours);
        assert!(estimate.estimated_tokens.is_some());
    }
}
