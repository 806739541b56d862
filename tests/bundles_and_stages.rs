//! Configuration-as-data integration tests
//!
//! Loads settings and validation bundles from disk, then runs staged and
//! batched lineages against pipelines built from them.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use critiq::candidate::Candidate;
use critiq::config::{load_bundles, load_settings};
use critiq::engine::{BatchJob, BatchRunner, GenerationRequest, Generator, IterationController, Pipeline, StagedValidation};
use critiq::error::TransientError;
use critiq::policy::Decision;
use critiq::reference::{InMemoryReferenceData, ReferenceDataProvider};
use critiq::report::{Feedback, FeedbackFormatter, JsonlSink, MemorySink, Termination, render_report};
use critiq::scoring::EvaluatorRegistry;
use critiq::validation::{GateChain, SpecGate};
use eyre::Result;
use serde_json::{Value, json};
use tempfile::TempDir;

const LESSON_PLAN: &str = r#"
name: lesson_plan
description: Pedagogical review of a single lesson
global_threshold: 0.8
margin: 0.2
gates:
  - name: schema
    critical: true
    checks:
      - check: non_empty
        path: title
      - check: reference_exists
        path: standard
rubrics:
  - name: completeness
    weight: 0.5
    threshold: 0.5
    criteria:
      - description: Has objectives and summary
        weight: 1.0
        evaluator:
          kind: field_present
          paths: [objectives, summary]
  - name: engagement
    weight: 0.5
    threshold: 0.5
    criteria:
      - description: At least four activities
        weight: 1.0
        evaluator:
          kind: min_items
          path: activities
          min: 4
"#;

const EXPORT_SCHEMA: &str = r#"
name: export_schema
global_threshold: 0.5
gates:
  - name: export
    critical: true
    checks:
      - check: required
        path: duration
      - check: each_item_has
        path: activities
        fields: [name]
rubrics:
  - name: presence
    weight: 1.0
    threshold: 0.0
    criteria:
      - description: Has a title
        weight: 1.0
        evaluator:
          kind: field_present
          paths: [title]
"#;

/// Returns the same body for every call
struct Fixed(Value);

#[async_trait]
impl Generator for Fixed {
    async fn generate(
        &self,
        request: &GenerationRequest,
        previous: Option<&Candidate>,
        _feedback: Option<&Feedback>,
    ) -> std::result::Result<Candidate, TransientError> {
        Ok(match previous {
            Some(prev) => prev.revise(self.0.clone()),
            None => Candidate::new(&request.lineage_id, self.0.clone()),
        })
    }
}

fn lesson(activities: usize) -> Value {
    json!({
        "title": "Equivalent fractions",
        "standard": "4.NF.1",
        "objectives": ["compare fractions"],
        "summary": "Fraction walls",
        "activities": (0..activities).map(|i| json!({"name": format!("activity {}", i)})).collect::<Vec<_>>(),
    })
}

fn reference() -> Arc<dyn ReferenceDataProvider> {
    Arc::new(InMemoryReferenceData::new().with_entry("4.NF.1", json!("Explain equivalent fractions")))
}

/// Writes both bundles plus a settings file pointing at them.
fn workspace(temp: &TempDir) -> Result<std::path::PathBuf> {
    let bundles = temp.path().join("bundles");
    fs::create_dir_all(&bundles)?;
    fs::write(bundles.join("lesson_plan.yml"), LESSON_PLAN)?;
    fs::write(bundles.join("export_schema.yaml"), EXPORT_SCHEMA)?;

    let settings = temp.path().join("critiq.yml");
    fs::write(
        &settings,
        format!(
            "engine:\n  max_iterations: 2\n  retry_budget: 1\nconcurrency:\n  max_lineages: 2\nreport:\n  display_limit: 3\n  sink_path: {}\nbundles:\n  dir: {}\n",
            temp.path().join("verdicts.jsonl").display(),
            bundles.display()
        ),
    )?;
    Ok(settings)
}

#[tokio::test]
async fn test_pipeline_from_bundle_on_disk() -> Result<()> {
    let temp = TempDir::new()?;
    let settings = load_settings(Some(&workspace(&temp)?))?;
    assert_eq!(settings.engine.max_iterations, 2);
    assert_eq!(settings.report.display_limit, 3);
    assert_eq!(FeedbackFormatter::from_settings(&settings).max_items, 3);

    let catalog = load_bundles(&settings)?;
    assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["export_schema", "lesson_plan"]);

    let bundle = catalog.get("lesson_plan").expect("bundle loaded");
    let pipeline = Pipeline::from_bundle(bundle, EvaluatorRegistry::new(), Some(reference()), &settings)?;
    assert_eq!(pipeline.decision_engine().margin(), 0.2);

    let good = pipeline.evaluate_once(&Candidate::new("lin-1", lesson(4)), 1).await?;
    assert_eq!(good.decision, Decision::Accept);

    let mut unknown = lesson(4);
    unknown["standard"] = json!("9.ZZ.9");
    let bad = pipeline.evaluate_once(&Candidate::new("lin-2", unknown), 1).await?;
    assert_eq!(bad.decision, Decision::Reject);
    assert_eq!(bad.critical_issues, vec!["schema: `standard` refers to unknown reference `9.ZZ.9`"]);

    let report = render_report(&bad, settings.report.display_limit);
    assert!(report.contains("REJECT"));
    Ok(())
}

#[tokio::test]
async fn test_reference_checks_need_a_provider() -> Result<()> {
    let temp = TempDir::new()?;
    let settings = load_settings(Some(&workspace(&temp)?))?;
    let catalog = load_bundles(&settings)?;

    let bundle = catalog.get("lesson_plan").expect("bundle loaded");
    assert!(Pipeline::from_bundle(bundle, EvaluatorRegistry::new(), None, &settings).is_err());
    Ok(())
}

#[tokio::test]
async fn test_authoritative_stage_overturns_pedagogical_accept() -> Result<()> {
    let temp = TempDir::new()?;
    let settings = load_settings(Some(&workspace(&temp)?))?;
    let catalog = load_bundles(&settings)?;

    let lesson_bundle = catalog.get("lesson_plan").expect("bundle loaded");
    let pipeline = Pipeline::from_bundle(lesson_bundle, EvaluatorRegistry::new(), Some(reference()), &settings)?;

    let export_bundle = catalog.get("export_schema").expect("bundle loaded");
    let export = export_bundle
        .gates
        .iter()
        .cloned()
        .fold(GateChain::new(), |chain, spec| chain.with_gate(SpecGate::new(spec)));

    let sink = Arc::new(MemorySink::new());
    let controller = IterationController::new(Arc::new(pipeline), settings.engine.max_iterations)?;
    let staged = StagedValidation::new(controller)
        .then_gates("export_schema", export)
        .with_sink(sink.clone());

    // Pedagogically complete but missing the export-only `duration`
    let outcome = staged
        .run(&Fixed(lesson(4)), &GenerationRequest::new(json!({})))
        .await?;
    assert_eq!(outcome.result.decision, Decision::Reject);
    assert_eq!(outcome.result.termination, Some(Termination::Rejected));
    let failed = outcome.result.failed_gate().expect("export gate failed");
    assert_eq!(failed.gate_name, "export");
    assert_eq!(sink.len(), 1);

    let mut complete = lesson(4);
    complete["duration"] = json!(45);
    let outcome = staged
        .run(&Fixed(complete), &GenerationRequest::new(json!({})))
        .await?;
    assert_eq!(outcome.result.decision, Decision::Accept);
    assert_eq!(sink.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_batch_from_settings_writes_every_lineage() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp = TempDir::new()?;
    let settings = load_settings(Some(&workspace(&temp)?))?;
    let catalog = load_bundles(&settings)?;
    let bundle = catalog.get("lesson_plan").expect("bundle loaded");
    let pipeline = Arc::new(Pipeline::from_bundle(
        bundle,
        EvaluatorRegistry::new(),
        Some(reference()),
        &settings,
    )?);

    let runner = BatchRunner::from_settings(pipeline, &settings)?;
    let jobs: Vec<BatchJob> = [4, 2, 0]
        .into_iter()
        .enumerate()
        .map(|(i, activities)| {
            BatchJob::new(
                GenerationRequest::new(json!({})).with_lineage_id(format!("lin-{}", i)),
                Arc::new(Fixed(lesson(activities))),
            )
        })
        .collect();

    let outcomes = runner.run(jobs).await;
    let decisions = outcomes
        .into_iter()
        .map(|o| o.map(|o| (o.result.lineage_id, o.result.termination)))
        .collect::<critiq::Result<Vec<_>>>()?;
    assert_eq!(
        decisions,
        vec![
            ("lin-0".to_string(), Some(Termination::Accepted)),
            ("lin-1".to_string(), Some(Termination::MaxIterationsExhausted)),
            ("lin-2".to_string(), Some(Termination::Rejected)),
        ]
    );

    let sink_path = settings.report.sink_path.as_ref().expect("sink configured");
    let records = JsonlSink::new(sink_path)?.load()?;
    assert_eq!(records.len(), 3);
    Ok(())
}
