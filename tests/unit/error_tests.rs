use agent_inquiry::AppError;

#[test]
fn display_prefixes_identify_the_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Slack("bad".into()), "slack: bad"),
        (AppError::Delivery("bad".into()), "delivery: bad"),
        (AppError::Launch("bad".into()), "launch: bad"),
        (AppError::Io("bad".into()), "io: bad"),
        (AppError::Payload("bad".into()), "payload: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_messages_have_no_trailing_period() {
    let err = AppError::Launch("no terminal available".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("denied")));
}

#[test]
fn json_error_converts_to_payload_variant() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let err: AppError = json_err.into();
    assert!(matches!(err, AppError::Payload(ref msg) if msg.starts_with("invalid json")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let toml_err = toml::from_str::<toml::Value>("a = [").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn app_error_is_a_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Io("x".into()));
}
