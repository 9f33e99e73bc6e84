//! End-to-end tests for the default Legal Markdown pipeline.
//!
//! Adding a case is a matter of appending an entry to `TEST_CASES`: the
//! document, its caller-supplied metadata as JSON, and the exact output.

mod common;

use std::path::Path;
use std::thread;
use std::time::Duration;

use common::{MetadataBuilder, OptionsBuilder, TestHarness};
use legal_markdown::pipeline::{FnStep, PipelineConfig, PipelineContext, PipelineStep, StepStatus};
use legal_markdown::tracking::MixinKind;
use legal_markdown::{default_builder, process, BatchJob, BatchProcessor, Metadata, ProcessingOptions};

/// Represents a single end-to-end test case.
struct TestCase {
    /// Unique name for the test case
    name: &'static str,
    /// Document source
    content: &'static str,
    /// Metadata passed to the run, as a JSON object
    metadata: &'static str,
    /// Exact expected output
    expected: &'static str,
}

/// All test cases to run. Add new test cases here.
const TEST_CASES: &[TestCase] = &[
    TestCase {
        name: "variable_substitution",
        content: "Client: {{client}}",
        metadata: r#"{"client": "Acme"}"#,
        expected: "Client: Acme",
    },
    TestCase {
        name: "front_matter_metadata",
        content: "---\nclient: Acme\n---\nClient: {{client}}",
        metadata: "{}",
        expected: "Client: Acme",
    },
    TestCase {
        name: "resolved_values_are_not_rescanned",
        content: "{{name}}",
        metadata: r#"{"name": "{{fake}}"}"#,
        expected: "{{fake}}",
    },
    TestCase {
        name: "missing_value_left_visible",
        content: "Dear {{recipient}},",
        metadata: "{}",
        expected: "Dear {{recipient}},",
    },
    TestCase {
        name: "helper_call",
        content: "Fee: {{formatCurrency(fee)}}",
        metadata: r#"{"fee": 1200}"#,
        expected: "Fee: $1,200.00",
    },
    TestCase {
        name: "ternary_mixin",
        content: "Plan: {{premium ? \"Gold\" : \"Basic\"}}",
        metadata: r#"{"premium": true}"#,
        expected: "Plan: Gold",
    },
    TestCase {
        name: "front_matter_pins_today",
        content: "---\n\"@today\": 2020-01-01\n---\nDated {{@today}}, due {{addDays(@today, 30)}}",
        metadata: "{}",
        expected: "Dated 2020-01-01, due 2020-01-31",
    },
    TestCase {
        name: "unterminated_mixin_left_visible",
        content: "Dear {{client, welcome.",
        metadata: r#"{"client": "Acme"}"#,
        expected: "Dear {{client, welcome.",
    },
    TestCase {
        name: "malformed_mixin_left_visible",
        content: "Total {{upper(}} due",
        metadata: "{}",
        expected: "Total {{upper(}} due",
    },
    TestCase {
        name: "today_override",
        content: "Dated {{@today}}",
        metadata: "{}",
        expected: "Dated 2024-03-15",
    },
    // =========================================================================
    // Headers and references
    // =========================================================================
    TestCase {
        name: "header_counter_reset",
        content: "l. A\nll. B\nll. C\nl. D\nll. E",
        metadata: "{}",
        expected: "Article 1. A\nSection 1. B\nSection 2. C\nArticle 2. D\nSection 1. E",
    },
    TestCase {
        name: "header_reference",
        content: "l. Definitions\nl. Payment |pay|\nSee |pay| above.",
        metadata: "{}",
        expected: "Article 1. Definitions\nArticle 2. Payment\nSee Article 2. above.",
    },
    TestCase {
        name: "metadata_reference_fallback",
        content: "|client_name| and |nope|",
        metadata: r#"{"client_name": "Acme"}"#,
        expected: "Acme and |nope|",
    },
    TestCase {
        name: "custom_level_formats",
        content: "---\nlevel-one: \"Part %R\"\nlevel-two: \"%l1.%n\"\n---\nl. Intro\nll. Scope",
        metadata: "{}",
        expected: "Part I Intro\n1.1 Scope",
    },
    // =========================================================================
    // Blocks and clauses
    // =========================================================================
    TestCase {
        name: "empty_each_renders_nothing",
        content: "{{#each items}}X{{/each}}",
        metadata: r#"{"items": []}"#,
        expected: "",
    },
    TestCase {
        name: "numeric_zero_is_falsy",
        content: "{{#if count}}Yes{{/if}}",
        metadata: r#"{"count": 0}"#,
        expected: "",
    },
    TestCase {
        name: "string_zero_is_truthy",
        content: "{{#if count}}Yes{{/if}}",
        metadata: r#"{"count": "0"}"#,
        expected: "Yes",
    },
    TestCase {
        name: "legacy_section_loop",
        content: "{{#parties}}- {{name}}\n{{/parties}}",
        metadata: r#"{"parties": [{"name": "A"}, {"name": "B"}]}"#,
        expected: "- A\n- B\n",
    },
    TestCase {
        name: "handlebars_each_with_index",
        content: "{{#each parties}}{{@index}}:{{name}} {{/each}}",
        metadata: r#"{"parties": [{"name": "A"}, {"name": "B"}]}"#,
        expected: "0:A 1:B ",
    },
    TestCase {
        name: "optional_clause",
        content: "Terms.[ Arbitration applies.]{arbitration}[ Governed by NY law.]{ny}",
        metadata: r#"{"arbitration": false, "ny": true}"#,
        expected: "Terms. Governed by NY law.",
    },
];

/// Run a single test case through the full pipeline.
fn run_test_case(test_case: &TestCase) {
    let harness = TestHarness::new();
    let metadata = MetadataBuilder::from_json(
        serde_json::from_str(test_case.metadata).expect("test metadata is valid JSON"),
    )
    .build();

    let result = harness.run(test_case.content, metadata, harness.options().build());

    assert!(
        result.success,
        "Test '{}': pipeline failed: {:?}",
        test_case.name, result.errors
    );
    assert_eq!(
        result.content, test_case.expected,
        "Test '{}': unexpected output",
        test_case.name
    );
}

#[test]
fn test_all_cases() {
    for case in TEST_CASES {
        run_test_case(case);
    }
}

#[test]
fn test_case_names_are_unique() {
    let mut names: Vec<&str> = TEST_CASES.iter().map(|c| c.name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), TEST_CASES.len());
}

fn get_fixture_path(relative: &str) -> std::path::PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[test]
fn test_service_agreement_fixture() {
    let harness = TestHarness::new();
    let source = std::fs::read_to_string(get_fixture_path("documents/service-agreement.md"))
        .expect("Failed to read fixture");
    let options = harness
        .options()
        .base_path(&get_fixture_path("documents"))
        .field_tracking()
        .build();

    let result = harness.run(&source, Default::default(), options);
    assert!(result.success, "errors: {:?}", result.errors);

    let expected = std::fs::read_to_string(get_fixture_path("documents/service-agreement.expected.md"))
        .expect("Failed to read expected output");
    assert_eq!(result.content.trim_end(), expected.trim_end());

    let imported = result.metadata["_imported_files"].as_array().expect("imports recorded");
    assert_eq!(imported.len(), 1);

    let report = result.field_report.as_ref().expect("tracking enabled");
    assert!(report.total > 0);
    assert_eq!(report.empty, 0);
    assert_eq!(result.step("field-tracking").map(|s| &s.status), Some(&StepStatus::Completed));
}

#[test]
fn test_process_leaves_unresolvable_text_alone() {
    let cases = [
        ("See |nope| below.", "See |nope| below."),
        ("Dear {{client, welcome.", "Dear {{client, welcome."),
        ("Total {{upper(}} due", "Total {{upper(}} due"),
    ];
    for (source, expected) in cases {
        let result = process(source, ProcessingOptions::default()).expect("default pipeline builds");
        assert!(result.success, "{source}: {:?}", result.errors);
        assert_eq!(result.content, expected, "{source}");
    }
}

#[test]
fn test_batch_field_reports_stay_per_document() {
    let processor = BatchProcessor::with_default_pipeline(PipelineConfig::default(), 2)
        .expect("batch processor starts");
    let jobs: Vec<BatchJob> = (0..4)
        .map(|i| {
            BatchJob::new(format!("{{{{field_{i}}}}} and {{{{shared}}}}"))
                .with_metadata(MetadataBuilder::new().set("shared", "S").build())
                .with_options(OptionsBuilder::new().field_tracking().build())
        })
        .collect();

    let results = processor.process_all(jobs);

    assert_eq!(results.len(), 4);
    for (i, job_result) in results.iter().enumerate() {
        assert_eq!(job_result.result.content, format!("{{{{field_{i}}}}} and S"));
        let report = job_result.result.field_report.as_ref().expect("tracking on");
        let names: Vec<String> = report.fields.iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, vec![format!("field_{i}"), "shared".to_string()]);
        assert!(report.fields.iter().all(|f| f.occurrences == 1));
    }
}

#[test]
fn test_timed_out_custom_step_leaves_run_untouched() {
    let slow = FnStep(|c: &str, _: &mut Metadata, ctx: &PipelineContext| {
        thread::sleep(Duration::from_millis(200));
        ctx.warn("late annotation");
        if let Some(tracker) = ctx.active_tracker() {
            tracker.track("late_field", None, false, MixinKind::Variable);
        }
        Ok(c.to_string())
    });
    let settle = FnStep(|c: &str, _: &mut Metadata, _: &PipelineContext| {
        thread::sleep(Duration::from_millis(400));
        Ok(c.to_string())
    });
    let config = PipelineConfig {
        continue_on_error: true,
        ..PipelineConfig::default()
    };
    let pipeline = default_builder(config)
        .expect("default steps register")
        .register(PipelineStep::new("annotate", 75, slow).with_timeout(Duration::from_millis(20)))
        .expect("annotate registers")
        .register(PipelineStep::new("settle", 85, settle))
        .expect("settle registers")
        .build()
        .expect("pipeline builds");

    let metadata = MetadataBuilder::new().set("title", "Terms").build();
    let result = pipeline.execute("l. {{title}}", metadata, OptionsBuilder::new().field_tracking().build());

    assert_eq!(result.content, "Article 1. Terms");
    assert_eq!(result.step("annotate").map(|s| &s.status), Some(&StepStatus::Failed));
    assert_eq!(result.step("settle").map(|s| &s.status), Some(&StepStatus::Completed));
    assert!(result.warnings.iter().all(|w| !w.contains("late annotation")));

    let report = result.field_report.as_ref().expect("tracking on");
    let names: Vec<&str> = report.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["title"]);
}
