//! Table-driven tests for configuration loading and validation.
//!
//! Tests cover YAML and JSON config files and their effect on a run.

mod common;

use legal_markdown::config::{load_config, load_config_from_str, ConfigFormat};
use legal_markdown::pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineStep};
use legal_markdown::process_with_config;
use legal_markdown::steps::{MixinsStep, MIXINS};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config YAML content to test.
    config_yaml: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

/// All YAML config loading test cases.
const YAML_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "empty_file",
        config_yaml: "",
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_yaml: r#"
pipeline:
  continue_on_error: true
  enable_metrics: false
  default_step_timeout_ms: 5000
processing:
  enable_field_tracking: true
  skip_steps: [metadata-export]
headers:
  - "Chapter %n."
  - "%l1.%n"
logging:
  level: debug
  json: true
batch:
  worker_count: 2
"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unknown_step_in_filter",
        config_yaml: "processing:\n  only_steps: [mixins, spellcheck]\n",
        should_succeed: false,
        expected_error: Some("Unknown step 'spellcheck'"),
    },
    ConfigTestCase {
        name: "zero_timeout",
        config_yaml: "pipeline:\n  default_step_timeout_ms: 0\n",
        should_succeed: false,
        expected_error: Some("default_step_timeout_ms must be greater than 0"),
    },
    ConfigTestCase {
        name: "empty_header_list",
        config_yaml: "headers: []\n",
        should_succeed: false,
        expected_error: Some("at least one level format"),
    },
    ConfigTestCase {
        name: "blank_header_format",
        config_yaml: "headers:\n  - \"Article %n.\"\n  - \"\"\n",
        should_succeed: false,
        expected_error: Some("level 2 is empty"),
    },
    ConfigTestCase {
        name: "bad_log_level",
        config_yaml: "logging:\n  level: loud\n",
        should_succeed: false,
        expected_error: Some("Unknown log level: loud"),
    },
    ConfigTestCase {
        name: "zero_workers",
        config_yaml: "batch:\n  worker_count: 0\n",
        should_succeed: false,
        expected_error: Some("worker_count must be at least 1"),
    },
    ConfigTestCase {
        name: "malformed_yaml",
        config_yaml: "pipeline: [unclosed\n",
        should_succeed: false,
        expected_error: Some("Failed to parse config YAML"),
    },
];

fn run_config_test(test_case: &ConfigTestCase) {
    let result = load_config_from_str(test_case.config_yaml, ConfigFormat::Yaml);
    match (result, test_case.should_succeed) {
        (Ok(_), true) => {}
        (Ok(_), false) => panic!("Test '{}': expected failure, got success", test_case.name),
        (Err(e), true) => panic!("Test '{}': expected success, got {}", test_case.name, e),
        (Err(e), false) => {
            if let Some(expected) = test_case.expected_error {
                assert!(
                    e.to_string().contains(expected),
                    "Test '{}': error '{}' does not contain '{}'",
                    test_case.name,
                    e,
                    expected
                );
            }
        }
    }
}

#[test]
fn test_yaml_configs() {
    for case in YAML_CONFIG_TESTS {
        run_config_test(case);
    }
}

#[test]
fn test_json_config_file() {
    let harness = common::TestHarness::new();
    let path = harness.write_file(
        "config.json",
        r#"{"headers": ["Clause %n:"], "batch": {"worker_count": 1}}"#,
    );

    let config = load_config(&path).expect("JSON config loads");
    assert_eq!(config.headers.0, vec!["Clause %n:".to_string()]);
    assert_eq!(config.batch.worker_count, 1);
    assert!(config.pipeline.enable_metrics);
}

#[test]
fn test_config_drives_a_run() {
    let config = load_config_from_str(
        "headers:\n  - \"Clause %n:\"\nprocessing:\n  no_mixins: true\n",
        ConfigFormat::Yaml,
    )
    .expect("config loads");

    let result = process_with_config("l. {{title}}", &config).expect("pipeline builds");

    assert!(result.success);
    assert_eq!(result.content, "Clause 1: {{title}}");
}

#[test]
fn test_config_filters_are_checked_against_the_built_pipeline() {
    let config = load_config_from_str("processing:\n  skip_steps: [headers]\n", ConfigFormat::Yaml)
        .expect("config loads");
    let pipeline_config = PipelineConfig::from_config(&config);
    assert_eq!(pipeline_config.skip_steps, vec!["headers".to_string()]);

    let err = Pipeline::builder(pipeline_config)
        .register(PipelineStep::new(MIXINS, 70, MixinsStep::new()))
        .expect("mixins registers")
        .build()
        .err()
        .expect("headers is not registered");
    assert_eq!(err, PipelineError::UnknownStep("headers".to_string()));

    let result = process_with_config("l. Terms", &config).expect("default pipeline builds");
    assert_eq!(result.content, "l. Terms");
}
