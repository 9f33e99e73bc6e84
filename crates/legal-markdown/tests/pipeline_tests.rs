//! Integration tests for pipeline behavior visible through the public API:
//! highlighting, exports, step filters, events and batch runs.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{MetadataBuilder, OptionsBuilder, TestHarness};
use legal_markdown::pipeline::{
    ChannelListener, ErrorCode, PipelineConfig, PipelineEvent, SkipReason, StepStatus,
};
use legal_markdown::steps::{default_builder, FIELD_TRACKING, HEADERS, IMPORTS, MIXINS};
use legal_markdown::{BatchJob, BatchProcessor, ExportFormat, Metadata};

#[test]
fn test_highlight_marks_filled_and_missing_fields() {
    let harness = TestHarness::new();
    let metadata = MetadataBuilder::new().set("client", "Acme").build();
    let options = harness.options().highlight().build();

    let result = harness.run("{{client}} / {{vendor}}", metadata, options);

    assert!(result.success);
    assert!(result
        .content
        .contains(r#"<span class="legal-field imported-value" data-field="client">Acme</span>"#));
    assert!(result
        .content
        .contains(r#"<span class="legal-field missing-value" data-field="vendor">{{vendor}}</span>"#));

    let report = result.field_report.expect("highlighting implies tracking");
    assert_eq!(report.filled, 1);
    assert_eq!(report.empty, 1);
}

#[test]
fn test_no_report_without_tracking() {
    let harness = TestHarness::new();
    let result = harness.run_simple("{{client}}");
    assert!(result.field_report.is_none());
    assert_eq!(
        result.step(FIELD_TRACKING).map(|s| &s.status),
        Some(&StepStatus::Skipped(SkipReason::OptionDisabled))
    );
}

#[test]
fn test_front_matter_requests_json_export() {
    let harness = TestHarness::new();
    let doc = "---\nclient: Acme\nmeta-json-output: out/meta.json\n---\nHello {{client}}";
    let options = harness.options().build();

    let result = harness.run(doc, Metadata::new(), options);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.content, "Hello Acme");
    assert_eq!(result.exported_files.len(), 1);

    let exported: serde_json::Value =
        serde_json::from_str(&harness.read_file("out/meta.json")).expect("valid JSON export");
    assert_eq!(exported["client"], json!("Acme"));
    assert!(exported.get("meta-json-output").is_none());
}

#[test]
fn test_export_option_writes_yaml() {
    let harness = TestHarness::new();
    let target = harness.path().join("export.yaml");
    let metadata = MetadataBuilder::new().set("client", "Acme").build();
    let options = harness.options().export(ExportFormat::Yaml, &target).build();

    let result = harness.run("{{client}}", metadata, options);

    assert!(result.success);
    let exported: serde_yaml::Value =
        serde_yaml::from_str(&harness.read_file("export.yaml")).expect("valid YAML export");
    assert_eq!(exported["client"], serde_yaml::Value::from("Acme"));
}

#[test]
fn test_import_from_harness_directory() {
    let harness = TestHarness::new();
    harness.write_file("clauses/confidentiality.md", "---\nterm: 5 years\n---\nConfidential for {{term}}.");

    let result = harness.run_simple("l. Confidentiality\n@import clauses/confidentiality.md");

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.content, "Article 1. Confidentiality\nConfidential for 5 years.");
}

#[test]
fn test_missing_import_halts_run() {
    let harness = TestHarness::new();
    let source = "Before\n@import nowhere.md";

    let result = harness.run_simple(source);

    assert!(!result.success);
    assert_eq!(result.step(IMPORTS).map(|s| &s.status), Some(&StepStatus::Failed));
    assert!(result.step(MIXINS).is_none());
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn test_step_filters() {
    let cases: &[(&str, fn(OptionsBuilder) -> OptionsBuilder, &str)] = &[
        ("skip headers", |o| o.skip_steps(&[HEADERS]), "l. Terms"),
        ("no headers option", |o| o.no_headers(), "l. Terms"),
        ("no mixins option", |o| o.no_mixins(), "Article 1. {{title}}"),
        ("only mixins", |o| o.only_steps(&[MIXINS]), "l. Terms"),
        ("no filters", |o| o, "Article 1. Terms"),
    ];

    let harness = TestHarness::new();
    for (name, configure, expected) in cases {
        let metadata = MetadataBuilder::new().set("title", "Terms").build();
        let options = configure(harness.options()).build();
        let result = harness.run("l. {{title}}", metadata, options);
        assert!(result.success, "{name}: {:?}", result.errors);
        assert_eq!(result.content, *expected, "{name}");
    }
}

#[test]
fn test_unknown_filter_is_a_configuration_error() {
    let harness = TestHarness::new();
    let options = harness.options().only_steps(&["no-such-step"]).build();

    let result = harness.run("{{x}}", Metadata::new(), options);

    assert!(!result.success);
    assert_eq!(result.content, "{{x}}");
    assert_eq!(result.errors[0].code, ErrorCode::Configuration);
}

#[test]
fn test_events_follow_step_order() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let pipeline = default_builder(PipelineConfig::default())
        .expect("default steps register")
        .listener(ChannelListener::new(tx))
        .build()
        .expect("default pipeline builds");

    let result = pipeline.execute("Hi", Metadata::new(), OptionsBuilder::new().build());
    assert!(result.success);

    let events: Vec<PipelineEvent> = rx.try_iter().collect();
    assert!(matches!(events.first(), Some(PipelineEvent::PipelineStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::PipelineCompleted { success: true, .. })
    ));

    let started: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StepStarted { step, .. } => Some(step.as_str()),
            _ => None,
        })
        .collect();
    let mixins = started.iter().position(|s| *s == MIXINS).expect("mixins ran");
    let headers = started.iter().position(|s| *s == HEADERS).expect("headers ran");
    assert!(mixins < headers);
}

#[test]
fn test_batch_keeps_documents_apart() {
    let processor = BatchProcessor::with_default_pipeline(PipelineConfig::default(), 3)
        .expect("batch processor starts");
    let jobs: Vec<BatchJob> = (0..6)
        .map(|i| {
            BatchJob::new(format!("---\nparty: P{i}\n---\nParty {{{{party}}}}"))
                .with_options(OptionsBuilder::new().field_tracking().build())
        })
        .collect();
    let ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();

    let results = processor.process_all(jobs);

    assert_eq!(results.len(), 6);
    for (i, (job_result, id)) in results.iter().zip(&ids).enumerate() {
        assert_eq!(&job_result.id, id);
        assert!(job_result.success());
        assert_eq!(job_result.result.content, format!("Party P{i}"));
        let report = job_result.result.field_report.as_ref().expect("tracking on");
        assert_eq!(report.total, 1);
    }
}

#[test]
fn test_shared_pipeline_across_threads() {
    let harness = Arc::new(TestHarness::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let harness = Arc::clone(&harness);
            std::thread::spawn(move || {
                let metadata = MetadataBuilder::new().set("n", i).build();
                harness.run("n={{n}}", metadata, OptionsBuilder::new().field_tracking().build())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().expect("run does not panic");
        assert_eq!(result.content, format!("n={i}"));
        assert_eq!(result.field_report.expect("tracking on").total, 1);
    }
}
