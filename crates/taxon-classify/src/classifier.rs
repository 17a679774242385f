//! Multi-signal document classifier.
//!
//! Three sources vote: file/path patterns, hint/synonym matches in the text,
//! and (optionally) an LLM verdict. Each vote adds `weight × raw_score` to a
//! per-concept accumulator; the highest total wins.

use std::sync::Arc;
use std::time::Instant;

use regex::RegexBuilder;
use tracing::{debug, warn};

use taxon_core::defaults::{
    CLASSIFY_EXCERPT_CHARS, HINT_STEP, HINT_WEIGHT, HINT_WINDOW_CHARS, LLM_WEIGHT,
    PATTERN_RAW_SCORE, PATTERN_WEIGHT,
};
use taxon_core::{Classification, ClassificationSignal, Concept, LlmClient, SignalMethod};
use taxon_ontology::Ontology;

use crate::excerpt;

/// Weights and bounds for [`Classifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub pattern_weight: f32,
    pub hint_weight: f32,
    pub llm_weight: f32,
    /// Raw score of a file/path pattern hit.
    pub pattern_raw_score: f32,
    /// Raw score added per distinct hint matched (capped at 1.0).
    pub hint_step: f32,
    /// Leading characters of text searched for hints.
    pub hint_window_chars: usize,
    /// Leading characters of text sent to the LLM.
    pub excerpt_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pattern_weight: PATTERN_WEIGHT,
            hint_weight: HINT_WEIGHT,
            llm_weight: LLM_WEIGHT,
            pattern_raw_score: PATTERN_RAW_SCORE,
            hint_step: HINT_STEP,
            hint_window_chars: HINT_WINDOW_CHARS,
            excerpt_chars: CLASSIFY_EXCERPT_CHARS,
        }
    }
}

impl ClassifierConfig {
    /// Defaults overridden by `TAXON_CLASSIFY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let read_f32 = |name: &str, target: &mut f32| {
            if let Ok(val) = std::env::var(name) {
                match val.parse::<f32>() {
                    Ok(v) if (0.0..=1.0).contains(&v) => *target = v,
                    _ => warn!(value = %val, var = name, "Invalid weight, using default"),
                }
            }
        };
        read_f32("TAXON_CLASSIFY_PATTERN_WEIGHT", &mut config.pattern_weight);
        read_f32("TAXON_CLASSIFY_HINT_WEIGHT", &mut config.hint_weight);
        read_f32("TAXON_CLASSIFY_LLM_WEIGHT", &mut config.llm_weight);

        if let Ok(val) = std::env::var("TAXON_CLASSIFY_HINT_WINDOW_CHARS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.hint_window_chars = n,
                _ => warn!(value = %val, "Invalid TAXON_CLASSIFY_HINT_WINDOW_CHARS, using default"),
            }
        }
        config
    }

    pub fn with_weights(mut self, pattern: f32, hint: f32, llm: f32) -> Self {
        self.pattern_weight = pattern;
        self.hint_weight = hint;
        self.llm_weight = llm;
        self
    }

    pub fn with_hint_window(mut self, chars: usize) -> Self {
        self.hint_window_chars = chars;
        self
    }
}

/// Insertion-ordered score accumulator; ties go to the earliest concept.
#[derive(Default)]
struct Scores {
    totals: Vec<(String, f32)>,
}

impl Scores {
    fn add(&mut self, concept_id: &str, amount: f32) {
        match self.totals.iter_mut().find(|(id, _)| id == concept_id) {
            Some((_, total)) => *total += amount,
            None => self.totals.push((concept_id.to_string(), amount)),
        }
    }

    fn winner(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (id, total) in &self.totals {
            if best.map_or(true, |(_, top)| *total > top) {
                best = Some((id.as_str(), *total));
            }
        }
        best
    }
}

/// Scores documents against the classifiable concepts of an ontology.
#[derive(Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config, llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Classify a document.
    ///
    /// Never fails: an LLM error is logged and the rule-based signals decide.
    /// Every fired signal is returned, not only the winner's.
    pub async fn classify(
        &self,
        ontology: &Ontology,
        text: &str,
        filename: &str,
        original_path: Option<&str>,
    ) -> Classification {
        let start = Instant::now();
        let candidates = ontology.classifiable_concepts();
        if candidates.is_empty() {
            debug!(subsystem = "classify", "No classifiable concepts, returning Unknown");
            return Classification::unknown();
        }

        let mut signals = Vec::new();
        signals.extend(self.pattern_signals(&candidates, filename, original_path));
        signals.extend(self.hint_signals(&candidates, text));

        let mut reasoning = None;
        if let Some(signal) = self.llm_signal(ontology, text, &mut reasoning).await {
            signals.push(signal);
        }

        let mut scores = Scores::default();
        for signal in &signals {
            scores.add(&signal.concept_id, signal.score);
        }

        let classification = match scores.winner() {
            Some((concept_id, total)) => Classification {
                primary_concept_id: concept_id.to_string(),
                confidence: total.clamp(0.0, 1.0),
                signals,
                reasoning,
            },
            None => Classification::unknown(),
        };

        debug!(
            subsystem = "classify",
            concept_id = %classification.primary_concept_id,
            confidence = classification.confidence,
            signal_count = classification.signals.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Classified document"
        );
        classification
    }

    fn pattern_signals(
        &self,
        candidates: &[&Concept],
        filename: &str,
        original_path: Option<&str>,
    ) -> Vec<ClassificationSignal> {
        let filename = filename.to_lowercase();
        let path = original_path.map(str::to_lowercase);

        let mut signals = Vec::new();
        for concept in candidates {
            let hit = concept.file_patterns().iter().find_map(|pattern| {
                let needle = strip_glob(pattern);
                if needle.is_empty() {
                    return None;
                }
                let in_path = path.as_deref().is_some_and(|p| p.contains(&needle));
                (in_path || filename.contains(&needle)).then_some(pattern)
            });
            if let Some(pattern) = hit {
                signals.push(ClassificationSignal {
                    method: SignalMethod::FilePattern,
                    concept_id: concept.id.clone(),
                    raw_score: self.config.pattern_raw_score,
                    score: self.config.pattern_weight * self.config.pattern_raw_score,
                    explanation: format!("file pattern '{}' matched", pattern),
                });
            }
        }
        signals
    }

    fn hint_signals(&self, candidates: &[&Concept], text: &str) -> Vec<ClassificationSignal> {
        let window = excerpt(text, self.config.hint_window_chars);
        if window.trim().is_empty() {
            return Vec::new();
        }

        let mut signals = Vec::new();
        for concept in candidates {
            let mut terms: Vec<String> = Vec::new();
            for term in concept.hints().iter().chain(concept.synonyms.iter()) {
                let term = term.trim().to_lowercase();
                if !term.is_empty() && !terms.contains(&term) {
                    terms.push(term);
                }
            }

            let matched: Vec<&str> = terms
                .iter()
                .filter(|term| word_match(window, term))
                .map(String::as_str)
                .collect();
            if matched.is_empty() {
                continue;
            }

            let raw = (self.config.hint_step * matched.len() as f32).min(1.0);
            signals.push(ClassificationSignal {
                method: SignalMethod::Hint,
                concept_id: concept.id.clone(),
                raw_score: raw,
                score: self.config.hint_weight * raw,
                explanation: format!("matched hints: {}", matched.join(", ")),
            });
        }
        signals
    }

    async fn llm_signal(
        &self,
        ontology: &Ontology,
        text: &str,
        reasoning: &mut Option<String>,
    ) -> Option<ClassificationSignal> {
        let llm = self.llm.as_ref()?;
        let snippet = excerpt(text, self.config.excerpt_chars);
        if snippet.trim().is_empty() {
            return None;
        }

        let verdict = match llm.classify_document(snippet, &ontology.catalogue()).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    subsystem = "classify",
                    provider = llm.provider_name(),
                    error = %e,
                    "LLM classification failed, using rule-based signals only"
                );
                return None;
            }
        };

        if !ontology.is_classifiable(&verdict.concept_id) {
            debug!(
                concept_id = %verdict.concept_id,
                "LLM named an unknown or abstract concept, ignoring"
            );
            return None;
        }

        let raw = if verdict.confidence.is_finite() {
            verdict.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        *reasoning = verdict.reasoning.clone();
        Some(ClassificationSignal {
            method: SignalMethod::Llm,
            concept_id: verdict.concept_id,
            raw_score: raw,
            score: self.config.llm_weight * raw,
            explanation: verdict
                .reasoning
                .unwrap_or_else(|| format!("{} content analysis", llm.provider_name())),
        })
    }
}

/// A classification forced by the caller, bypassing every signal source.
pub fn override_classification(concept_id: &str) -> Classification {
    Classification {
        primary_concept_id: concept_id.to_string(),
        confidence: 1.0,
        signals: vec![ClassificationSignal {
            method: SignalMethod::Override,
            concept_id: concept_id.to_string(),
            raw_score: 1.0,
            score: 1.0,
            explanation: "concept override".to_string(),
        }],
        reasoning: None,
    }
}

/// `"*invoice*.pdf"` → `"invoice.pdf"`.
fn strip_glob(pattern: &str) -> String {
    pattern
        .chars()
        .filter(|c| !matches!(c, '*' | '?' | '[' | ']'))
        .collect::<String>()
        .to_lowercase()
}

/// Case-insensitive whole-word match.
fn word_match(haystack: &str, term: &str) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(term));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(haystack),
        Err(e) => {
            debug!(term, error = %e, "Hint is not a valid pattern, skipping");
            false
        }
    }
}
