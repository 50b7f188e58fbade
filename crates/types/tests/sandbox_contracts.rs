use std::time::Duration;

use tracing_subscriber::EnvFilter;
use types::{
    DEFAULT_MEMORY_LIMIT_RESERVE, DEFAULT_SANDBOX_IMAGE, DEFAULT_TIME_LIMIT_RESERVE,
    DEFAULT_TRACING_FILTER, ExecutionResult, InputFile, ResultParseError, ResultStatus, RunOptions,
    SandboxConfig, SandboxConfigError, StagingError, init_tracing, sandbox_basename,
    sandboxed_path,
};

#[test]
fn result_file_round_trips_through_parse() {
    let result = ExecutionResult {
        status: "OK".to_owned(),
        debug_info: String::new(),
        time_usage: 123,
        memory_usage: 456,
    };

    let parsed =
        ExecutionResult::parse(&result.to_result_file()).expect("rendered result should parse");
    assert_eq!(parsed, result);
}

#[test]
fn result_file_parse_keeps_debug_info_and_ignores_trailing_lines() {
    let parsed = ExecutionResult::parse(
        "Runtime Error\nWIFEXITED - WEXITSTATUS() = 1\n  1500 \n2048\n\nextra\n",
    )
    .expect("result should parse");
    assert_eq!(parsed.status, "Runtime Error");
    assert_eq!(parsed.debug_info, "WIFEXITED - WEXITSTATUS() = 1");
    assert_eq!(parsed.time_usage, 1500);
    assert_eq!(parsed.memory_usage, 2048);
    assert_eq!(parsed.verdict(), ResultStatus::RuntimeError);
}

#[test]
fn result_file_parse_rejects_missing_lines() {
    assert_eq!(
        ExecutionResult::parse(""),
        Err(ResultParseError::MissingField { field: "status" })
    );
    assert_eq!(
        ExecutionResult::parse("OK"),
        Err(ResultParseError::MissingField {
            field: "debug_info"
        })
    );
    assert_eq!(
        ExecutionResult::parse("OK\n\n50"),
        Err(ResultParseError::MissingField {
            field: "memory_usage"
        })
    );
    assert_eq!(
        ExecutionResult::parse("OK\n\n50\n"),
        Err(ResultParseError::MissingField {
            field: "memory_usage"
        })
    );
}

#[test]
fn result_file_parse_rejects_non_numeric_usage() {
    assert_eq!(
        ExecutionResult::parse("OK\n\nfast\n2048"),
        Err(ResultParseError::InvalidInteger {
            field: "time_usage",
            value: "fast".to_owned(),
        })
    );
}

#[test]
fn result_status_classifies_enforcement_tokens() {
    assert_eq!(
        ResultStatus::from_token("Time Limit Exceeded"),
        ResultStatus::TimeLimitExceeded
    );
    assert!(ResultStatus::from_token("Memory Limit Exceeded").is_limit_exceeded());
    assert!(!ResultStatus::from_token("Exited Normally").is_limit_exceeded());
    assert_eq!(
        ResultStatus::from_token("OK"),
        ResultStatus::Other("OK".to_owned())
    );
    assert_eq!(ResultStatus::OutputLimitExceeded.as_str(), "Output Limit Exceeded");
}

#[test]
fn run_options_deserialize_with_reserve_defaults() {
    let options: RunOptions = serde_json::from_str(
        r#"{"program": "/tmp/a.out", "time_limit": 1000, "memory_limit": 65536, "output_files": ["out.txt"]}"#,
    )
    .expect("options should deserialize");

    assert_eq!(options.time_limit_reserve, DEFAULT_TIME_LIMIT_RESERVE);
    assert_eq!(options.memory_limit_reserve, DEFAULT_MEMORY_LIMIT_RESERVE);
    assert_eq!(options.process_limit, 0);
    assert_eq!(options.file_stdin, None);
    assert_eq!(options.output_files, vec!["out.txt".to_owned()]);
    assert_eq!(options, {
        let mut expected = RunOptions::new("/tmp/a.out");
        expected.time_limit = 1000;
        expected.memory_limit = 65536;
        expected.output_files = vec!["out.txt".to_owned()];
        expected
    });
}

#[test]
fn run_options_validation_rejects_names_without_basename() {
    let mut options = RunOptions::new("/tmp/a.out");
    options.input_files.push(InputFile::new("..", b"data".to_vec()));

    let error = options
        .validate()
        .expect_err("`..` should not be accepted as an input name");
    assert!(matches!(
        error,
        StagingError::InvalidFileName { ref name } if name == ".."
    ));

    let mut options = RunOptions::new("/tmp/a.out");
    options.file_stdout = Some(String::new());
    assert!(options.validate().is_err());

    let mut options = RunOptions::new("/tmp/a.out");
    options.file_stdin = Some("/data/in.txt".to_owned());
    options.output_files = vec!["nested/out.txt".to_owned()];
    options.validate().expect("plain paths should validate");
}

#[test]
fn sandboxed_path_rewrites_to_basename_under_root() {
    assert_eq!(
        sandboxed_path("/sandbox", "/data/in.txt").as_deref(),
        Some("/sandbox/in.txt")
    );
    assert_eq!(
        sandboxed_path("/sandbox/", "out.txt").as_deref(),
        Some("/sandbox/out.txt")
    );
    assert_eq!(sandboxed_path("/", "a.out").as_deref(), Some("/a.out"));
    assert_eq!(sandbox_basename("/"), None);
    assert_eq!(sandbox_basename(""), None);
}

#[test]
fn sandbox_config_defaults_validate() {
    let config = SandboxConfig::default();
    config.validate().expect("defaults should validate");
    assert_eq!(config.image, DEFAULT_SANDBOX_IMAGE);
    assert_eq!(config.sandbox_uid, 1111);
    assert_eq!(config.sandbox_gid, 1111);
    assert_eq!(config.network_mode, "none");
    assert!(config.readonly_binds().contains(&"/usr/lib:/usr/lib:ro".to_owned()));
    assert!(
        config
            .readonly_binds()
            .iter()
            .all(|bind| bind.ends_with(":ro"))
    );
}

#[test]
fn sandbox_config_rejects_relative_paths_and_zero_bounds() {
    let config = SandboxConfig {
        result_path: "result.txt".to_owned(),
        ..SandboxConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(SandboxConfigError::RelativePath {
            field: "result_path",
            value: "result.txt".to_owned(),
        })
    );

    let mut config = SandboxConfig::default();
    config.polling.file_fetch_attempts = 0;
    assert_eq!(
        config.validate(),
        Err(SandboxConfigError::ZeroValue {
            field: "polling.file_fetch_attempts"
        })
    );
}

#[test]
fn exec_timeout_scales_with_time_limit() {
    let polling = SandboxConfig::default().polling;
    assert_eq!(
        polling.exec_timeout(5, 1),
        Duration::from_secs(5 + 1 + polling.exec_grace_secs)
    );
    assert_eq!(
        polling.exec_timeout(0, 1),
        Duration::from_secs(polling.unlimited_exec_timeout_secs)
    );
}

#[test]
fn tracing_init_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn trailing_slash_names_stage_under_their_last_component() {
    let mut options = RunOptions::new("/tmp/a.out");
    options.output_files = vec!["out/".to_owned()];
    options.validate().expect("trailing slash keeps a usable base name");
    assert_eq!(
        sandboxed_path("/sandbox", "out/").as_deref(),
        Some("/sandbox/out")
    );
}

#[test]
fn removal_wait_defaults_to_five_seconds_and_must_be_positive() {
    let mut config = SandboxConfig::default();
    assert_eq!(config.polling.removal_timeout(), Duration::from_secs(5));

    config.polling.removal_timeout_ms = 0;
    assert_eq!(
        config.validate(),
        Err(SandboxConfigError::ZeroValue {
            field: "polling.removal_timeout_ms"
        })
    );
}

#[test]
fn default_tracing_filter_scopes_sandbox_logs() {
    let filter = EnvFilter::try_new(DEFAULT_TRACING_FILTER).expect("default filter should parse");
    let rendered = filter.to_string();
    assert!(rendered.contains("docker_sandbox=info"));
    assert!(rendered.contains("warn"));
}
