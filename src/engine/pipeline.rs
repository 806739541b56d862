//! Pipeline - the immutable evaluation configuration.
//!
//! A pipeline owns the gate chain, compiled rubrics, aggregator, threshold
//! policy and decision engine for one document type. Every configuration
//! defect is reported by [`PipelineBuilder::build`]; a built pipeline never
//! fails on configuration mid-run. Share it between lineages with `Arc`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::config::{EngineSettings, ValidationBundle};
use crate::error::{CritiqError, Result};
use crate::policy::{DecisionEngine, DecisionInput, ThresholdPolicy, ThresholdPolicySpec};
use crate::reference::ReferenceDataProvider;
use crate::report::{EvaluationResult, PassRecord, ResultReporter};
use crate::scoring::rubric::check_unit_interval;
use crate::scoring::{Aggregate, Aggregator, DimensionScorer, EvaluatorRegistry, Rubric, RubricSpec, compile_rubrics};
use crate::validation::{EvalContext, Gate, GateChain, GateSpec, SpecGate};

enum GateSource {
    Spec(GateSpec),
    Custom(Arc<dyn Gate>),
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    name: String,
    gates: Vec<GateSource>,
    rubrics: Vec<RubricSpec>,
    registry: EvaluatorRegistry,
    global_threshold: Option<f64>,
    policy: Option<ThresholdPolicySpec>,
    margin: f64,
    reference: Option<Arc<dyn ReferenceDataProvider>>,
    reference_timeout: Duration,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gates: Vec::new(),
            rubrics: Vec::new(),
            registry: EvaluatorRegistry::new(),
            global_threshold: None,
            policy: None,
            margin: DecisionEngine::default().margin(),
            reference: None,
            reference_timeout: Duration::from_secs(5),
        }
    }

    /// Append a declarative gate
    pub fn with_gate_spec(mut self, spec: GateSpec) -> Self {
        self.gates.push(GateSource::Spec(spec));
        self
    }

    /// Append a gate implemented in code
    pub fn with_gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(GateSource::Custom(Arc::new(gate)));
        self
    }

    pub fn with_rubric(mut self, spec: RubricSpec) -> Self {
        self.rubrics.push(spec);
        self
    }

    pub fn with_rubrics(mut self, specs: impl IntoIterator<Item = RubricSpec>) -> Self {
        self.rubrics.extend(specs);
        self
    }

    /// Evaluators referenced by `kind: custom` criteria
    pub fn with_registry(mut self, registry: EvaluatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_global_threshold(mut self, threshold: f64) -> Self {
        self.global_threshold = Some(threshold);
        self
    }

    /// Without a policy the global threshold applies to every iteration
    pub fn with_threshold_policy(mut self, policy: ThresholdPolicySpec) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_reference(mut self, provider: Arc<dyn ReferenceDataProvider>) -> Self {
        self.reference = Some(provider);
        self
    }

    pub fn with_reference_timeout(mut self, timeout: Duration) -> Self {
        self.reference_timeout = timeout;
        self
    }

    /// Validate everything and build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let global_threshold = self
            .global_threshold
            .ok_or_else(|| CritiqError::config(format!("pipeline `{}` has no global threshold", self.name)))?;
        check_unit_interval("global threshold", global_threshold)?;

        let mut chain = GateChain::new();
        let mut names = HashSet::new();
        for source in self.gates {
            let gate: Arc<dyn Gate> = match source {
                GateSource::Spec(spec) => {
                    spec.validate()?;
                    Arc::new(SpecGate::new(spec))
                }
                GateSource::Custom(gate) => gate,
            };
            if !names.insert(gate.name().to_string()) {
                return Err(CritiqError::config(format!("duplicate gate `{}`", gate.name())));
            }
            chain = chain.add_shared(gate);
        }

        if self.rubrics.is_empty() {
            return Err(CritiqError::config(format!("pipeline `{}` has no rubrics", self.name)));
        }
        let rubrics = compile_rubrics(&self.rubrics, &self.registry)?;
        let aggregator = Aggregator::from_rubrics(&rubrics, global_threshold)?;

        let dimensions: Vec<&str> = rubrics.iter().map(|r| r.name.as_str()).collect();
        let policy = match &self.policy {
            Some(spec) => ThresholdPolicy::compile(spec, &dimensions)?,
            None => ThresholdPolicy::constant(global_threshold)?,
        };
        let decisions = DecisionEngine::new(self.margin)?;

        let needs_reference = chain.uses_reference() || rubrics.iter().any(Rubric::uses_reference);
        let mut ctx = EvalContext::new(self.reference_timeout);
        match self.reference {
            Some(provider) => ctx = ctx.with_reference(provider),
            None if needs_reference => {
                return Err(CritiqError::config(format!(
                    "pipeline `{}` consults reference data but no provider was supplied",
                    self.name
                )));
            }
            None => {}
        }

        tracing::debug!(
            pipeline = %self.name,
            gates = chain.len(),
            dimensions = rubrics.len(),
            "Pipeline built"
        );

        Ok(Pipeline {
            name: self.name,
            gates: chain,
            rubrics,
            scorer: DimensionScorer::new(),
            aggregator,
            policy,
            decisions,
            reporter: ResultReporter::new(),
            ctx,
        })
    }
}

/// Immutable evaluation configuration for one document type.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    gates: GateChain,
    rubrics: Vec<Rubric>,
    scorer: DimensionScorer,
    aggregator: Aggregator,
    policy: ThresholdPolicy,
    decisions: DecisionEngine,
    reporter: ResultReporter,
    ctx: EvalContext,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Build a pipeline from a validation bundle.
    ///
    /// The bundle's margin, when set, overrides `settings.engine.margin`.
    pub fn from_bundle(
        bundle: &ValidationBundle,
        registry: EvaluatorRegistry,
        reference: Option<Arc<dyn ReferenceDataProvider>>,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let mut builder = PipelineBuilder::new(&bundle.name)
            .with_registry(registry)
            .with_global_threshold(bundle.global_threshold)
            .with_rubrics(bundle.rubrics.iter().cloned())
            .with_margin(bundle.margin.unwrap_or(settings.engine.margin))
            .with_reference_timeout(settings.reference_timeout());

        for gate in &bundle.gates {
            builder = builder.with_gate_spec(gate.clone());
        }
        if let Some(policy) = &bundle.threshold_policy {
            builder = builder.with_threshold_policy(policy.clone());
        }
        if let Some(provider) = reference {
            builder = builder.with_reference(provider);
        }

        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gates(&self) -> &GateChain {
        &self.gates
    }

    pub fn rubrics(&self) -> &[Rubric] {
        &self.rubrics
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn decision_engine(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    /// One gate, score, aggregate and decide pass.
    ///
    /// Deterministic for a given candidate and iteration. The only error
    /// is [`CritiqError::Transient`], raised when a collaborator call
    /// failed and the pass reached no verdict.
    pub async fn evaluate_once(&self, candidate: &Candidate, iteration: u32) -> Result<EvaluationResult> {
        let outcome = self.gates.evaluate(candidate, &self.ctx).await?;

        let (dimension_results, aggregate, effective, critical_issues, has_notes) = if outcome.passed() {
            let dims = self.scorer.score(candidate, &self.rubrics, &self.ctx).await?;
            let aggregate = self.aggregator.aggregate(&dims)?;
            let effective = self.policy.effective_threshold(iteration, &dims);
            let critical: Vec<String> = dims.iter().flat_map(|d| d.critical_issues()).collect();
            let has_notes = dims.iter().any(|d| !d.issues.is_empty());
            (Some(dims), aggregate, effective, critical, has_notes)
        } else {
            // No dimension scores means no relaxation
            let effective = self.policy.effective_threshold(iteration, &[]);
            (None, Aggregate::not_scored(), effective, outcome.critical_issues(), false)
        };

        let decision = self.decisions.decide(DecisionInput {
            overall_score: aggregate.overall_score,
            effective_threshold: effective.threshold,
            critical_issues: &critical_issues,
            has_notes,
        });

        tracing::debug!(
            pipeline = %self.name,
            lineage = %candidate.lineage_id(),
            iteration,
            score = ?aggregate.overall_score,
            threshold = effective.threshold,
            relaxed_fallback = effective.fell_back,
            decision = %decision,
            "Pass evaluated"
        );

        Ok(self.reporter.assemble(PassRecord {
            candidate,
            iteration,
            gate_results: outcome.results,
            dimension_results,
            aggregate,
            effective_threshold: effective.threshold,
            decision,
            critical_issues,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Decision;
    use crate::reference::InMemoryReferenceData;
    use crate::scoring::{CriterionSpec, EvaluatorSpec};
    use crate::validation::CheckSpec;
    use serde_json::json;

    fn rubric(name: &str, weight: f64, evaluator: EvaluatorSpec) -> RubricSpec {
        RubricSpec {
            name: name.to_string(),
            weight,
            threshold: 0.5,
            criteria: vec![CriterionSpec {
                description: format!("{} criterion", name),
                weight: 1.0,
                acceptable_at: 1.0,
                critical: false,
                evaluator,
            }],
        }
    }

    fn schema_gate() -> GateSpec {
        GateSpec {
            name: "schema".into(),
            critical: false,
            checks: vec![
                CheckSpec::NonEmpty { path: "title".into() },
                CheckSpec::MinItems {
                    path: "objectives".into(),
                    min: 2,
                },
            ],
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::builder("lesson")
            .with_gate_spec(schema_gate())
            .with_rubric(rubric(
                "completeness",
                0.5,
                EvaluatorSpec::FieldPresent {
                    paths: vec!["title".into(), "summary".into()],
                },
            ))
            .with_rubric(rubric(
                "coverage",
                0.5,
                EvaluatorSpec::MinItems {
                    path: "objectives".into(),
                    min: 2,
                },
            ))
            .with_global_threshold(0.7)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_gate_failure_skips_scoring() {
        let candidate = Candidate::new("lin", json!({"title": "", "objectives": ["one"]}));
        let result = pipeline().evaluate_once(&candidate, 1).await.unwrap();

        let gates = result.gate_results.as_ref().unwrap();
        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].failed_checks.len(), 2);
        assert!(result.dimension_results.is_none());
        assert!(result.overall_score.is_none());
        assert!(!result.overall_pass);
        assert_eq!(result.decision, Decision::Refine);
    }

    #[tokio::test]
    async fn test_custom_critical_gate_rejects() {
        use crate::error::TransientError;
        use crate::validation::GateResult;
        use async_trait::async_trait;

        struct DateGate;

        #[async_trait]
        impl Gate for DateGate {
            fn name(&self) -> &str {
                "facts"
            }

            fn is_critical(&self) -> bool {
                true
            }

            async fn evaluate(&self, _candidate: &Candidate, _ctx: &EvalContext) -> std::result::Result<GateResult, TransientError> {
                Ok(GateResult::fail("facts", vec!["wrong date".to_string()]))
            }
        }

        let pipeline = Pipeline::builder("lesson")
            .with_gate(DateGate)
            .with_rubric(rubric(
                "completeness",
                1.0,
                EvaluatorSpec::FieldPresent {
                    paths: vec!["title".into()],
                },
            ))
            .with_global_threshold(0.7)
            .build()
            .unwrap();

        let candidate = Candidate::new("lin", json!({"title": "Fractions"}));
        let result = pipeline.evaluate_once(&candidate, 1).await.unwrap();
        assert_eq!(result.decision, Decision::Reject);
        assert_eq!(result.critical_issues, vec!["facts: wrong date".to_string()]);
    }

    #[tokio::test]
    async fn test_scored_pass() {
        let candidate = Candidate::new("lin", json!({"title": "Fractions", "objectives": ["a", "b"]}));
        let result = pipeline().evaluate_once(&candidate, 1).await.unwrap();

        assert_eq!(result.overall_score, Some(0.75));
        assert!(result.overall_pass);
        assert_eq!(result.decision, Decision::AcceptWithNotes);
        let names: Vec<&str> = result
            .dimension_results
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.dimension_name.as_str())
            .collect();
        assert_eq!(names, vec!["completeness", "coverage"]);
    }

    #[tokio::test]
    async fn test_evaluate_once_is_deterministic() {
        let p = pipeline();
        let candidate = Candidate::new("lin", json!({"title": "Fractions", "objectives": ["a"]}));
        let a = p.evaluate_once(&candidate, 1).await.unwrap();
        let b = p.evaluate_once(&candidate, 1).await.unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_build_requires_threshold_and_rubrics() {
        let err = Pipeline::builder("x")
            .with_rubric(rubric("a", 1.0, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no global threshold"));

        let err = Pipeline::builder("x").with_global_threshold(0.8).build().unwrap_err();
        assert!(err.to_string().contains("no rubrics"));
    }

    #[test]
    fn test_build_rejects_duplicate_gates() {
        let err = Pipeline::builder("x")
            .with_gate_spec(schema_gate())
            .with_gate_spec(schema_gate())
            .with_rubric(rubric("a", 1.0, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
            .with_global_threshold(0.8)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate gate `schema`"));
    }

    #[test]
    fn test_build_rejects_bad_weights() {
        let err = Pipeline::builder("x")
            .with_rubric(rubric("a", 0.6, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
            .with_rubric(rubric("b", 0.6, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
            .with_global_threshold(0.8)
            .build()
            .unwrap_err();
        assert!(matches!(err, CritiqError::Config(_)));
    }

    #[test]
    fn test_build_rejects_policy_with_unknown_dimension() {
        let policy: ThresholdPolicySpec = serde_yaml::from_str(
            "stages:\n  - from: 1\n    threshold: 0.8\n    conditions:\n      - dimension: tone\n        min_score: 0.9\n",
        )
        .unwrap();
        let err = Pipeline::builder("x")
            .with_rubric(rubric("a", 1.0, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
            .with_global_threshold(0.8)
            .with_threshold_policy(policy)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown dimension `tone`"));
    }

    #[test]
    fn test_reference_use_requires_provider() {
        let build = |provider: Option<Arc<dyn ReferenceDataProvider>>| {
            let mut builder = Pipeline::builder("x")
                .with_gate_spec(GateSpec {
                    name: "facts".into(),
                    critical: true,
                    checks: vec![CheckSpec::ReferenceExists { path: "subject".into() }],
                })
                .with_rubric(rubric("a", 1.0, EvaluatorSpec::FieldPresent { paths: vec!["t".into()] }))
                .with_global_threshold(0.8);
            if let Some(p) = provider {
                builder = builder.with_reference(p);
            }
            builder.build()
        };

        assert!(build(None).is_err());
        assert!(build(Some(Arc::new(InMemoryReferenceData::new()))).is_ok());
    }

    #[test]
    fn test_from_bundle_applies_margin_override() {
        let bundle: ValidationBundle = serde_yaml::from_str(
            r#"
name: worksheet
global_threshold: 0.8
margin: 0.2
rubrics:
  - name: completeness
    weight: 1.0
    threshold: 0.5
    criteria:
      - description: Has title
        weight: 1.0
        evaluator:
          kind: field_present
          paths: [title]
"#,
        )
        .unwrap();

        let p = Pipeline::from_bundle(&bundle, EvaluatorRegistry::new(), None, &EngineSettings::default()).unwrap();
        assert_eq!(p.name(), "worksheet");
        assert_eq!(p.decision_engine().margin(), 0.2);
        assert!(p.gates().is_empty());
        assert_eq!(p.policy().scheduled_threshold(4), 0.8);
    }
}
