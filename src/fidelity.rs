use std::collections::HashSet;

use crate::config::FidelityConfig;
use crate::model::{NewConceptsAnalysis, TestStep};
use crate::text::{SimilarityScorer, Vocabulary};

/// Measures how much of a candidate text's vocabulary is absent from a
/// source text.
pub struct FidelityAnalyzer<'a> {
    vocabulary: &'a Vocabulary,
    scorer: &'a dyn SimilarityScorer,
    similarity_cutoff: f64,
}

/// Keywords of one source document, extracted once and reused per step.
pub struct SourceKeywords {
    ordered: Vec<String>,
    lookup: HashSet<String>,
}

/// Per-step drift of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDriftReport {
    pub analyses: Vec<NewConceptsAnalysis>,
    /// 1-indexed numbers of the steps whose drift exceeds the threshold.
    pub problematic_steps: Vec<usize>,
    pub max_ratio: f64,
}

impl<'a> FidelityAnalyzer<'a> {
    pub fn new(
        vocabulary: &'a Vocabulary,
        scorer: &'a dyn SimilarityScorer,
        config: &FidelityConfig,
    ) -> Self {
        Self {
            vocabulary,
            scorer,
            similarity_cutoff: config.similarity_cutoff,
        }
    }

    pub fn source_keywords(&self, source_text: &str) -> SourceKeywords {
        let ordered = self.vocabulary.extract_keywords(source_text);
        let lookup = ordered.iter().cloned().collect();
        SourceKeywords { ordered, lookup }
    }

    pub fn analyze_new_concepts(
        &self,
        source_text: &str,
        target_text: &str,
        threshold: f64,
    ) -> NewConceptsAnalysis {
        let source = self.source_keywords(source_text);
        self.analyze_against(&source, target_text, threshold)
    }

    pub fn analyze_against(
        &self,
        source: &SourceKeywords,
        target_text: &str,
        threshold: f64,
    ) -> NewConceptsAnalysis {
        let target = self.vocabulary.extract_keywords(target_text);
        let new_keywords = target
            .iter()
            .filter(|keyword| !self.is_grounded(source, keyword))
            .cloned()
            .collect::<Vec<String>>();

        let new_concept_ratio = new_keywords.len() as f64 / target.len().max(1) as f64;
        NewConceptsAnalysis {
            has_new_concepts: new_concept_ratio > threshold,
            new_concept_ratio,
            new_keywords,
            total_keywords: target.len(),
        }
    }

    /// Analyzes each step (`action input expected_result`) separately so
    /// drift is attributed to individual steps.
    pub fn analyze_steps(
        &self,
        source: &SourceKeywords,
        steps: &[TestStep],
        threshold: f64,
    ) -> StepDriftReport {
        let analyses = steps
            .iter()
            .map(|step| self.analyze_against(source, &step_text(step), threshold))
            .collect::<Vec<NewConceptsAnalysis>>();

        let problematic_steps = analyses
            .iter()
            .enumerate()
            .filter(|(_, analysis)| analysis.has_new_concepts)
            .map(|(index, _)| index + 1)
            .collect();
        let max_ratio = analyses
            .iter()
            .map(|analysis| analysis.new_concept_ratio)
            .fold(0.0, f64::max);

        StepDriftReport {
            analyses,
            problematic_steps,
            max_ratio,
        }
    }

    fn is_grounded(&self, source: &SourceKeywords, keyword: &str) -> bool {
        self.vocabulary.is_generic(keyword)
            || source.lookup.contains(keyword)
            || source
                .ordered
                .iter()
                .any(|known| self.scorer.similarity(keyword, known) > self.similarity_cutoff)
    }
}

pub fn step_text(step: &TestStep) -> String {
    format!(
        "{} {} {}",
        step.action,
        step.input,
        step.expected_result.as_deref().unwrap_or_default()
    )
}
