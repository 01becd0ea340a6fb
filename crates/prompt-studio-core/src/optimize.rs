//! The feedback-driven optimization loop.
//!
//! ```text
//! analyze template ─► sample contexts ─► design initial query
//!                                             │
//!        ┌────────────────────────────────────┘
//!        ▼
//!   retrieve ─► assemble ─► generate ─► evaluate ─► record ─► track best
//!        ▲                                                       │
//!        │                                       success? ─yes─► stop
//!        │                                                       │ no
//!        └──── refine query ◄── assess context ◄── more left? ◄──┘
//! ```
//!
//! # Stopping rule
//!
//! The loop stops early only when an iteration is flagged successful, its
//! score reaches `success_threshold`, *and* at least `min_iterations` have
//! run. Otherwise it runs to `max_iterations`.
//!
//! # Best-tracked result
//!
//! The returned prompt is always the best-scoring one seen, replaced only
//! on a strictly greater score. Ties keep the earlier iteration. An early
//! stop can therefore return an earlier iteration's prompt than the one
//! that triggered it.
//!
//! # Failures
//!
//! Any collaborator error aborts the run and is returned as-is. No partial
//! history is returned.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{step, Result, StudioError};
use crate::models::{
    ChatPrompt, ExpectedOutput, OptimizationIteration, OptimizationResult, OptimizationStatus,
};
use crate::prompt::{assemble_prompt, GenerationParams};
use crate::providers::{ContextRetriever, EvaluationProvider, GenerationProvider, QueryProvider};
use crate::template::analyze_template;

/// Generic query used to sample the corpus before the first iteration.
pub const SAMPLE_QUERY: &str = "main content summary overview";

/// Best score at or above which an exhausted run counts as `completed`.
pub const COMPLETED_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub success_threshold: f64,
    /// Contexts retrieved per iteration.
    pub top_k: usize,
    /// Contexts sampled to seed the initial query.
    pub sample_contexts: usize,
    /// Wall-clock budget for the whole run, checked between steps.
    #[serde(default)]
    pub deadline: Option<Duration>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            min_iterations: 3,
            max_iterations: 5,
            success_threshold: 0.85,
            top_k: 5,
            sample_contexts: 3,
            deadline: None,
        }
    }
}

impl OptimizationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(StudioError::Validation(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.min_iterations > self.max_iterations {
            return Err(StudioError::Validation(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        if !(0.0..=1.0).contains(&self.success_threshold) {
            return Err(StudioError::Validation(format!(
                "success_threshold must be within [0, 1], got {}",
                self.success_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(StudioError::Validation("top_k must be at least 1".into()));
        }
        Ok(())
    }
}

/// Drives one optimization run over borrowed collaborators.
pub struct OptimizationController<'a> {
    retriever: &'a dyn ContextRetriever,
    generator: &'a dyn GenerationProvider,
    evaluator: &'a dyn EvaluationProvider,
    queries: &'a dyn QueryProvider,
    params: GenerationParams,
    config: OptimizationConfig,
}

struct Best {
    score: f64,
    iteration: usize,
    prompt: Option<ChatPrompt>,
}

impl Best {
    /// With no positive score seen, the last iteration stands in as best.
    fn fall_back_to_last(&mut self, iterations: &[OptimizationIteration]) {
        if self.prompt.is_none() {
            if let Some(last) = iterations.last() {
                self.iteration = last.iteration;
                self.prompt = Some(last.generated_prompt.clone());
            }
        }
    }
}

impl<'a> OptimizationController<'a> {
    pub fn new(
        retriever: &'a dyn ContextRetriever,
        generator: &'a dyn GenerationProvider,
        evaluator: &'a dyn EvaluationProvider,
        queries: &'a dyn QueryProvider,
        params: GenerationParams,
        config: OptimizationConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            evaluator,
            queries,
            params,
            config,
        }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Run the loop for `expected`, optionally restricted to `document_ids`.
    pub async fn optimize(
        &self,
        expected: &ExpectedOutput,
        document_ids: Option<&[String]>,
    ) -> Result<OptimizationResult> {
        expected.validate()?;
        self.config.validate()?;
        let started = Instant::now();

        let analysis = analyze_template(expected);
        tracing::info!(
            placeholders = analysis.placeholders.len(),
            structure = %analysis.structure_type,
            "template analyzed"
        );

        let samples: Vec<String> = self
            .retriever
            .retrieve(SAMPLE_QUERY, self.config.sample_contexts, document_ids)
            .await?
            .into_iter()
            .map(|c| c.content)
            .collect();

        let mut query = self
            .queries
            .design_initial_query(expected, &analysis, &samples)
            .await?;
        tracing::info!(query = %preview(&query), "initial query designed");

        let mut iterations: Vec<OptimizationIteration> = Vec::new();
        let mut best = Best {
            score: 0.0,
            iteration: 0,
            prompt: None,
        };

        for n in 1..=self.config.max_iterations {
            self.check_deadline(started)?;
            tracing::info!(iteration = n, "starting iteration");

            let contexts: Vec<String> = self
                .retriever
                .retrieve(&query, self.config.top_k, document_ids)
                .await?
                .into_iter()
                .map(|c| c.content)
                .collect();
            tracing::debug!(iteration = n, retrieved = contexts.len(), "contexts retrieved");

            let prompt = assemble_prompt(expected, &query, &contexts, Some(&analysis), &self.params);
            let output = self.generator.generate(&prompt).await?;
            let evaluation = self
                .evaluator
                .evaluate(&output, expected, &contexts, n)
                .await?;
            let score = evaluation.match_score;
            tracing::info!(iteration = n, score, successful = evaluation.is_successful, "iteration evaluated");

            if score > best.score {
                best.score = score;
                best.iteration = n;
                best.prompt = Some(prompt.clone());
                tracing::info!(iteration = n, score, "new best score");
            }

            let stop = evaluation.is_successful
                && score >= self.config.success_threshold
                && n >= self.config.min_iterations;

            iterations.push(OptimizationIteration {
                iteration: n,
                query: query.clone(),
                retrieved_contexts: contexts,
                generated_prompt: prompt,
                evaluation,
            });

            if stop {
                best.fall_back_to_last(&iterations);
                tracing::info!(iteration = n, best = best.score, "optimization successful");
                let message = format!(
                    "Optimization successful! Best score: {:.2} (iteration {})",
                    best.score, best.iteration
                );
                return finish(best, iterations, OptimizationStatus::Success, message);
            }

            if n < self.config.max_iterations {
                self.check_deadline(started)?;
                let last = &iterations[iterations.len() - 1];
                let assessment = self
                    .evaluator
                    .assess_context_quality(expected, &last.retrieved_contexts)
                    .await?;
                let refined = self
                    .queries
                    .refine_query(
                        &query,
                        &last.evaluation.root_causes,
                        &last.evaluation.improvement_suggestions,
                        &assessment,
                    )
                    .await?;
                tracing::info!(query = %preview(&refined), "query refined");
                query = refined;
            }
        }

        best.fall_back_to_last(&iterations);
        let status = if best.score >= COMPLETED_THRESHOLD {
            OptimizationStatus::Completed
        } else {
            OptimizationStatus::NeedsImprovement
        };
        tracing::info!(
            best = best.score,
            best_iteration = best.iteration,
            status = status.as_str(),
            "optimization finished"
        );
        let message = format!(
            "Completed {} iterations. Best score: {:.2} (from iteration {})",
            iterations.len(),
            best.score,
            best.iteration
        );
        finish(best, iterations, status, message)
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        match self.config.deadline {
            Some(limit) if started.elapsed() >= limit => Err(StudioError::provider(
                step::DEADLINE,
                format!("optimization exceeded its {:?} budget", limit),
            )),
            _ => Ok(()),
        }
    }
}

fn finish(
    best: Best,
    iterations: Vec<OptimizationIteration>,
    status: OptimizationStatus,
    message: String,
) -> Result<OptimizationResult> {
    let final_prompt = best
        .prompt
        .ok_or_else(|| StudioError::Validation("optimization ran no iterations".into()))?;

    Ok(OptimizationResult {
        final_prompt,
        total_iterations: iterations.len(),
        iterations,
        final_match_score: best.score,
        best_iteration: best.iteration,
        status,
        message,
    })
}

fn preview(s: &str) -> String {
    s.chars().take(100).collect()
}
