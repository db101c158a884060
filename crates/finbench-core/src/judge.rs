//! LLM-as-judge grading.
//!
//! A [`JudgeTemplate`] carries the prompt text, the ordered score rules and
//! the normalization that turns the judge's raw number into `[0, 1]`.
//! [`JudgeDispatcher`] fills the template, makes the second inference call
//! and extracts the score. A failed call or an unparseable reply is
//! `Unscored`, which counts as 0.0; grading never aborts a run.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::client::InferenceClient;
use crate::payload::GenerationOptions;

/// How the raw judge number maps into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "ceiling", rename_all = "snake_case")]
pub enum Normalization {
    /// Rubric scored out of `K`: `raw / K`, clamped.
    DivideByCeiling(f64),
    /// Binary rubric: `raw` clamped to `[0, 1]`.
    ClampToUnit,
}

impl Normalization {
    pub fn apply(&self, raw: f64) -> f64 {
        let scaled = match *self {
            Normalization::DivideByCeiling(k) if k > 0.0 => raw / k,
            Normalization::DivideByCeiling(_) => 0.0,
            Normalization::ClampToUnit => raw,
        };
        scaled.clamp(0.0, 1.0)
    }
}

/// Which extraction patterns apply, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRules {
    /// `boxed{N}`, then `判断:`/`judgment:`, then `结果:`/`result:`.
    Verdict,
    /// `boxed{N}`, then `分数:`/`得分:`/`score:`, then a trailing `N 分`/`N points`.
    Rubric,
}

const NUMBER: &str = r"(\d+(?:\.\d+)?)";

fn boxed() -> String {
    format!(r"boxed\{{\s*{NUMBER}\s*\}}")
}

fn verdict_rules() -> &'static [Regex] {
    static RULES: OnceLock<Vec<Regex>> = OnceLock::new();
    RULES.get_or_init(|| {
        compile(&[
            boxed(),
            format!(r"(?i)(?:判断|judge?ment)\s*[:：]\s*{NUMBER}"),
            format!(r"(?i)(?:结果|result)\s*[:：]\s*{NUMBER}"),
        ])
    })
}

fn rubric_rules() -> &'static [Regex] {
    static RULES: OnceLock<Vec<Regex>> = OnceLock::new();
    RULES.get_or_init(|| {
        compile(&[
            boxed(),
            format!(r"(?i)(?:分数|得分|score)\s*[:：]\s*{NUMBER}"),
            format!(r"(?i){NUMBER}\s*(?:分|points?\b)"),
        ])
    })
}

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("built-in score pattern {p:?}: {e}")))
        .collect()
}

impl ScoreRules {
    fn patterns(&self) -> &'static [Regex] {
        match self {
            ScoreRules::Verdict => verdict_rules(),
            ScoreRules::Rubric => rubric_rules(),
        }
    }

    /// The raw number of the first pattern that matches.
    pub fn extract_raw(&self, text: &str) -> Option<f64> {
        self.patterns()
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    }
}

/// Prompt and scoring rules of one benchmark's judge.
///
/// `user` (and `system`, if set) may contain `{question}`, `{gold}` and `{pred}`.
#[derive(Debug, Clone, Serialize)]
pub struct JudgeTemplate {
    pub system: Option<String>,
    pub user: String,
    pub rules: ScoreRules,
    pub normalization: Normalization,
}

impl JudgeTemplate {
    pub fn binary(system: Option<&str>, user: &str) -> Self {
        Self {
            system: system.map(str::to_string),
            user: user.to_string(),
            rules: ScoreRules::Verdict,
            normalization: Normalization::ClampToUnit,
        }
    }

    pub fn rubric(system: Option<&str>, user: &str, ceiling: f64) -> Self {
        Self {
            system: system.map(str::to_string),
            user: user.to_string(),
            rules: ScoreRules::Rubric,
            normalization: Normalization::DivideByCeiling(ceiling),
        }
    }

    pub fn extract(&self, reply: &str) -> ScoreExtraction {
        match self.rules.extract_raw(reply) {
            Some(raw) => ScoreExtraction::Scored {
                raw,
                score: self.normalization.apply(raw),
            },
            None => ScoreExtraction::Unscored,
        }
    }
}

/// Inputs of one grading call.
#[derive(Debug, Clone)]
pub struct GradingRequest<'a> {
    pub gold: &'a str,
    pub predicted: &'a str,
    pub question: Option<&'a str>,
    pub template: &'a JudgeTemplate,
}

impl GradingRequest<'_> {
    /// Fills the template. Substitution is single-pass, so braces inside the
    /// answers are never re-expanded.
    pub fn render(&self) -> (Option<String>, String) {
        let system = self.template.system.as_deref().map(|s| self.fill(s));
        (system, self.fill(&self.template.user))
    }

    fn fill(&self, template: &str) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let re = PLACEHOLDER.get_or_init(|| {
            Regex::new(r"\{(question|gold|pred)\}").unwrap_or_else(|e| panic!("placeholder pattern: {e}"))
        });
        re.replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
            "question" => self.question.unwrap_or_default().to_string(),
            "gold" => self.gold.to_string(),
            _ => self.predicted.to_string(),
        })
        .into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreExtraction {
    Scored { raw: f64, score: f64 },
    Unscored,
}

impl ScoreExtraction {
    /// The caller-visible score; `Unscored` is 0.0.
    pub fn value(&self) -> f64 {
        match self {
            ScoreExtraction::Scored { score, .. } => *score,
            ScoreExtraction::Unscored => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscoredReason {
    CallFailed,
    NoPatternMatched,
}

#[derive(Debug, Clone, Serialize)]
pub struct JudgeVerdict {
    pub extraction: ScoreExtraction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unscored: Option<UnscoredReason>,
    /// The judge's free text, when the call succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl JudgeVerdict {
    pub fn score(&self) -> f64 {
        self.extraction.value()
    }
}

/// Judge defaults: deterministic sampling, buffered responses.
pub fn judge_generation_options() -> GenerationOptions {
    GenerationOptions {
        temperature: Some(0.0),
        max_tokens: Some(4096),
        top_p: Some(0.9),
        stream: false,
        ..GenerationOptions::default()
    }
}

pub struct JudgeDispatcher {
    client: Arc<InferenceClient>,
    limit: Option<Arc<Semaphore>>,
}

impl JudgeDispatcher {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client, limit: None }
    }

    /// Bounds the number of judge calls in flight across all workers.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(n.max(1))));
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub async fn judge(&self, request: &GradingRequest<'_>) -> JudgeVerdict {
        let (system, user) = request.render();
        let payload = self.client.payload(system.as_deref(), user);
        debug!(model = %payload.model, has_system = payload.system().is_some(), "judge prompt built");

        let _permit = match &self.limit {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        let reply = match self.client.call(&payload).await {
            Ok(response) => response.content,
            Err(failed) => {
                warn!(error = %failed, "judge call failed, item left unscored");
                return JudgeVerdict {
                    extraction: ScoreExtraction::Unscored,
                    unscored: Some(UnscoredReason::CallFailed),
                    reply: None,
                };
            }
        };

        let extraction = request.template.extract(&reply);
        match extraction {
            ScoreExtraction::Scored { raw, score } => {
                info!(raw, score, "judge reply scored");
            }
            ScoreExtraction::Unscored => {
                warn!(reply_chars = reply.len(), "no score pattern matched judge reply");
            }
        }
        JudgeVerdict {
            extraction,
            unscored: matches!(extraction, ScoreExtraction::Unscored)
                .then_some(UnscoredReason::NoPatternMatched),
            reply: Some(reply),
        }
    }

    /// Score in `[0, 1]` for a gold/prediction pair.
    pub async fn match_answer(
        &self,
        template: &JudgeTemplate,
        gold: &str,
        predicted: &str,
        question: Option<&str>,
    ) -> f64 {
        let request = GradingRequest {
            gold,
            predicted,
            question,
            template,
        };
        self.judge(&request).await.score()
    }
}
