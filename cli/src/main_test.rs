use super::*;
use clap::CommandFactory;
use wire::JobState;

#[test]
fn cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn flags_override_config() {
    let cli = Cli::parse_from([
        "postdeck",
        "--api-url",
        "https://api.example.com/",
        "--tenant-id",
        "acme",
        "job",
        "status",
        "j1",
    ]);

    let config = build_config(ClientConfig::default(), &cli).unwrap();

    assert_eq!(config.api_url, "https://api.example.com");
    assert_eq!(config.tenant_id.as_deref(), Some("acme"));
}

#[test]
fn invalid_api_url_is_rejected() {
    let cli = Cli::parse_from(["postdeck", "--api-url", "ftp://nope", "job", "status", "j1"]);
    let err = build_config(ClientConfig::default(), &cli).unwrap_err();
    assert_eq!(err.code(), "E_CONFIG_PARSE");
}

#[test]
fn upload_requires_files() {
    assert!(Cli::try_parse_from(["postdeck", "upload"]).is_err());
}

#[test]
fn wait_flags_override_poll_options() {
    let options = poll_options(&ClientConfig::default(), Some(250), None);
    assert_eq!(options.interval, Duration::from_millis(250));
    assert_eq!(options.timeout, Duration::from_secs(60));
}

#[test]
fn progress_position_scales_and_clamps() {
    assert_eq!(progress_position(0.0), 0);
    assert_eq!(progress_position(50.0), 500);
    assert_eq!(progress_position(100.0), PROGRESS_STEPS);
    assert_eq!(progress_position(140.0), PROGRESS_STEPS);
}

#[test]
fn job_json_unpacks_string_result() {
    let status = JobStatus {
        id: "j1".into(),
        status: JobState::Completed,
        progress: 100.0,
        result: Some(Value::String("{\"postId\":\"p9\"}".into())),
        error: None,
        created_at: None,
        finished_at: None,
    };

    let value = job_json(&status).unwrap();

    assert_eq!(value["status"], "completed");
    assert_eq!(value["result"]["postId"], "p9");
}

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[test]
fn api_url_flag_overrides_invalid_env_value() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { std::env::set_var("POSTDECK_API_URL", "ftp://bad") };

    let cli = Cli::parse_from(["postdeck", "--api-url", "https://good.example", "job", "status", "j1"]);
    let config = resolve_config(&cli);

    unsafe { std::env::remove_var("POSTDECK_API_URL") };
    assert_eq!(config.unwrap().api_url, "https://good.example");
}

#[test]
fn invalid_env_value_without_flag_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { std::env::set_var("POSTDECK_API_URL", "ftp://bad") };

    let cli = Cli::parse_from(["postdeck", "job", "status", "j1"]);
    let err = resolve_config(&cli).unwrap_err();

    unsafe { std::env::remove_var("POSTDECK_API_URL") };
    assert_eq!(err.code(), "E_CONFIG_PARSE");
}

#[test]
fn missing_job_reports_poll_not_found_code() {
    let err: CliError = PollError::JobNotFound("ghost".into()).into();
    assert_eq!(err.code(), "E_JOB_NOT_FOUND");
    assert_eq!(err.to_string(), "job ghost not found");
}
