//! Slack credential loading: keychain first, then environment variables.
//!
//! These tests mutate process-global env vars and run serially. The test
//! environment has no keychain entries for the `agent-inquiry` service, so
//! the env-var path is what gets exercised.

use agent_inquiry::config::GlobalConfig;

fn slack_config() -> GlobalConfig {
    GlobalConfig::from_toml_str("authorized_user_ids = [\"U1\"]\n\n[slack]\n").expect("config parses")
}

fn clear_env() {
    std::env::remove_var("SLACK_APP_TOKEN");
    std::env::remove_var("SLACK_BOT_TOKEN");
}

#[tokio::test]
#[serial_test::serial]
async fn env_var_credentials_are_loaded() {
    std::env::set_var("SLACK_APP_TOKEN", "xapp-test");
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");

    let mut config = slack_config();
    let result = config.load_credentials().await;
    clear_env();

    result.expect("credentials load from env");
    let slack = config.slack.expect("slack section");
    assert_eq!(slack.app_token, "xapp-test");
    assert_eq!(slack.bot_token, "xoxb-test");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_credentials_name_the_env_var() {
    clear_env();

    let mut config = slack_config();
    let err = config
        .load_credentials()
        .await
        .expect_err("missing credentials must fail");
    let msg = err.to_string();
    assert!(msg.contains("SLACK_APP_TOKEN"), "got: {msg}");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_bot_token_fails_after_app_token() {
    clear_env();
    std::env::set_var("SLACK_APP_TOKEN", "xapp-test");

    let mut config = slack_config();
    let result = config.load_credentials().await;
    clear_env();

    let msg = result.expect_err("bot token missing").to_string();
    assert!(msg.contains("SLACK_BOT_TOKEN"), "got: {msg}");
}

#[tokio::test]
#[serial_test::serial]
async fn local_only_config_needs_no_credentials() {
    clear_env();

    let mut config = GlobalConfig::default();
    config
        .load_credentials()
        .await
        .expect("no slack section means nothing to load");
    assert!(config.slack.is_none());
}
