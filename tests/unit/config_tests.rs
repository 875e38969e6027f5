use std::path::PathBuf;
use std::time::Duration;

use agent_inquiry::config::{GlobalConfig, LaunchStrategy};
use agent_inquiry::AppError;

fn sample_toml() -> &'static str {
    r#"
authorized_user_ids = ["U111", "U222"]

[slack]
recipient_label = "build-bot"
notify_on_shutdown = false

[timeouts]
ask_seconds = 120
session_seconds = 900

[local]
prompt_command = "/opt/agent-inquiry/bin/agent-inquiry-prompt"
launch = "direct"
poll_interval_ms = 100
heartbeat_window_ms = 3000
sweep_interval_seconds = 2
startup_grace_ms = 50
stop_grace_ms = 200
removal_delay_ms = 300
startup_timeout_seconds = 10

[countdown]
checkpoints = [60, 30]
final_seconds = 5
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.authorized_user_ids, vec!["U111", "U222"]);
    let slack = config.slack.as_ref().expect("slack section");
    assert_eq!(slack.recipient_label, "build-bot");
    assert!(!slack.notify_on_shutdown);
    assert!(slack.app_token.is_empty(), "tokens never come from TOML");
    assert_eq!(config.timeouts.ask_seconds, 120);
    assert_eq!(config.timeouts.session_seconds, 900);
    assert_eq!(config.local.launch, LaunchStrategy::Direct);
    assert_eq!(config.local.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.local.heartbeat_window(), Duration::from_secs(3));
    assert_eq!(config.local.sweep_interval(), Duration::from_secs(2));
    assert_eq!(config.local.startup_grace(), Duration::from_millis(50));
    assert_eq!(config.local.stop_grace(), Duration::from_millis(200));
    assert_eq!(config.local.removal_delay(), Duration::from_millis(300));
    assert_eq!(config.local.startup_timeout(), Duration::from_secs(10));
    assert_eq!(config.countdown.checkpoints, vec![60, 30]);
    assert_eq!(config.countdown.final_seconds, 5);
    assert_eq!(config.ask_timeout(), Duration::from_secs(120));
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config parses");

    assert!(config.slack.is_none());
    assert!(config.authorized_user_ids.is_empty());
    assert_eq!(config.timeouts.ask_seconds, 600);
    assert_eq!(config.timeouts.session_seconds, 1800);
    assert_eq!(config.local.launch, LaunchStrategy::Terminal);
    assert_eq!(config.local.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.local.heartbeat_window(), Duration::from_secs(2));
    assert_eq!(config.local.sweep_interval(), Duration::from_secs(5));
    assert_eq!(config.local.startup_grace(), Duration::from_millis(500));
    assert_eq!(config.local.stop_grace(), Duration::from_secs(1));
    assert_eq!(config.local.removal_delay(), Duration::from_secs(1));
    assert_eq!(config.local.startup_timeout(), Duration::from_secs(30));
    assert_eq!(config.countdown.checkpoints, vec![30, 15]);
    assert_eq!(config.countdown.final_seconds, 10);
}

#[test]
fn empty_slack_table_enables_remote_with_defaults() {
    let config = GlobalConfig::from_toml_str("[slack]\n").expect("config parses");
    let slack = config.slack.expect("slack section present");
    assert_eq!(slack.recipient_label, "agent");
    assert!(slack.notify_on_shutdown);
}

#[test]
fn zero_ask_timeout_is_rejected() {
    let result = GlobalConfig::from_toml_str("[timeouts]\nask_seconds = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str("[local]\npoll_interval_ms = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_heartbeat_window_is_rejected() {
    let result = GlobalConfig::from_toml_str("[local]\nheartbeat_window_ms = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn unknown_launch_strategy_is_rejected() {
    let result = GlobalConfig::from_toml_str("[local]\nlaunch = \"telepathy\"\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("authorized_user_ids = [");
    let err = result.expect_err("invalid toml must fail");
    assert!(err.to_string().starts_with("config:"), "got: {err}");
}

#[test]
fn duplicate_allow_list_entries_are_removed() {
    let config =
        GlobalConfig::from_toml_str("authorized_user_ids = [\"U1\", \"U2\", \"U1\"]\n").expect("parses");
    assert_eq!(config.authorized_user_ids, vec!["U1", "U2"]);
}

#[test]
fn countdown_checkpoints_are_sorted_descending() {
    let config =
        GlobalConfig::from_toml_str("[countdown]\ncheckpoints = [15, 45, 15, 30]\n").expect("parses");
    assert_eq!(config.countdown.checkpoints, vec![45, 30, 15]);
}

#[test]
fn is_authorized_checks_allow_list() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("parses");
    assert!(config.is_authorized("U111"));
    assert!(!config.is_authorized("U999"));
}

#[test]
fn explicit_prompt_command_is_used() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("parses");
    assert_eq!(
        config.local.resolve_prompt_command(),
        PathBuf::from("/opt/agent-inquiry/bin/agent-inquiry-prompt")
    );
}

#[test]
fn default_prompt_command_names_the_prompt_binary() {
    let config = GlobalConfig::default();
    let resolved = config.local.resolve_prompt_command();
    let name = resolved
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(name.starts_with("agent-inquiry-prompt"), "got: {name}");
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("loads");
    assert_eq!(config.timeouts.ask_seconds, 120);
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn shipped_example_config_parses() {
    let config = GlobalConfig::from_toml_str(include_str!("../../config.example.toml"))
        .expect("example config is valid");
    assert!(config.slack.is_some());
    assert_eq!(config.countdown.checkpoints, vec![30, 15]);
}
