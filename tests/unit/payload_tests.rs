use std::path::PathBuf;

use agent_inquiry::local::payload::StartupPayload;
use agent_inquiry::AppError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

fn sample() -> StartupPayload {
    StartupPayload {
        session_id: "agent-inquiry-abc".into(),
        title: "Release \"v2\" checklist".into(),
        output_dir: PathBuf::from("/tmp/agent-inquiry-abc"),
        timeout_seconds: Some(90),
    }
}

#[test]
fn encoded_payload_decodes_to_the_same_value() {
    let encoded = sample().encode().expect("encode");
    assert_eq!(StartupPayload::decode(&encoded).expect("decode"), sample());
}

#[test]
fn payload_json_uses_camel_case_keys() {
    let encoded = sample().encode().expect("encode");
    let json: serde_json::Value =
        serde_json::from_slice(&STANDARD.decode(encoded).expect("base64")).expect("json");

    assert_eq!(json["sessionId"], "agent-inquiry-abc");
    assert_eq!(json["outputDir"], "/tmp/agent-inquiry-abc");
    assert_eq!(json["timeoutSeconds"], 90);
}

#[test]
fn encoded_payload_is_shell_safe() {
    let encoded = sample().encode().expect("encode");
    assert!(encoded
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
}

#[test]
fn missing_timeout_is_accepted() {
    let raw = STANDARD.encode(r#"{"sessionId":"s","title":"t","outputDir":"/tmp/s"}"#);
    let payload = StartupPayload::decode(&raw).expect("decode");
    assert_eq!(payload.timeout_seconds, None);
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let encoded = format!("  {}\n", sample().encode().expect("encode"));
    assert!(StartupPayload::decode(&encoded).is_ok());
}

#[test]
fn invalid_base64_is_a_payload_error() {
    let err = StartupPayload::decode("not base64!!").expect_err("must fail");
    assert!(matches!(err, AppError::Payload(ref msg) if msg.contains("base64")));
}

#[test]
fn invalid_json_is_a_payload_error() {
    let err = StartupPayload::decode(&STANDARD.encode("{oops")).expect_err("must fail");
    assert!(matches!(err, AppError::Payload(ref msg) if msg.contains("json")));
}
