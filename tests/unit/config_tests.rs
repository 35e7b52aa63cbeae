use serial_test::serial;
use skillforge::workflow::Intent;
use skillforge::{config::GlobalConfig, AppError};

fn sample_toml(skills_root: &str) -> String {
    format!(
        r#"
skills_root = '{skills_root}'
instance_id = "desk-1"

[sidecar]
command = "node"
args = ["sidecar/agent-runner.js"]
default_model = "opus"
max_turns = 30
allowed_capabilities = ["Read", "Write"]

[sufficiency]
min_answer_chars = 8
vague_phrases = ["ask legal"]

[[intent_rules]]
pattern = "\\bship it\\b"
intent = "express"
"#
    )
}

fn minimal_toml(skills_root: &str) -> String {
    format!(
        r#"
skills_root = '{skills_root}'

[sidecar]
command = "node"
"#
    )
}

#[test]
fn parses_valid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = sample_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.instance_id, "desk-1");
    assert_eq!(config.sidecar.command, "node");
    assert_eq!(config.sidecar.args, ["sidecar/agent-runner.js"]);
    assert_eq!(config.sidecar.default_model, "opus");
    assert_eq!(config.sidecar.max_turns, 30);
    assert_eq!(config.sidecar.allowed_capabilities, ["Read", "Write"]);
    assert!(config.sidecar.api_key.is_none(), "api key is never read from TOML");
    assert_eq!(config.sufficiency.min_answer_chars, 8);
    assert_eq!(config.sufficiency.vague_phrases, ["ask legal"]);
    assert_eq!(config.intent_rules.len(), 1);
    assert_eq!(config.intent_rules[0].intent, Intent::Express);
    assert_eq!(
        config.skills_root,
        temp.path().canonicalize().expect("canonicalize temp path")
    );
}

#[test]
fn applies_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.sidecar.default_model, "sonnet");
    assert_eq!(config.sidecar.max_turns, 50);
    assert!(config.sidecar.allowed_capabilities.contains(&"Read".to_owned()));
    assert_eq!(config.sufficiency.min_answer_chars, 4);
    assert!(config.intent_rules.is_empty());
    assert!(!config.instance_id.is_empty(), "instance id is generated");
}

#[test]
fn db_path_defaults_beneath_skills_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert!(config.db_path().starts_with(&config.skills_root));
    assert!(config.db_path().ends_with("skillforge.db"));
}

#[test]
fn rejects_empty_sidecar_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"))
        .replace("command = \"node\"", "command = \"  \"");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("empty command rejected");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("sidecar.command")));
}

#[test]
fn rejects_zero_max_turns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}max_turns = 0\n",
        minimal_toml(temp.path().to_str().expect("utf8 path"))
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero turns rejected");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("max_turns")));
}

#[test]
fn rejects_invalid_intent_pattern() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}\n[[intent_rules]]\npattern = \"(unclosed\"\nintent = \"resume\"\n",
        minimal_toml(temp.path().to_str().expect("utf8 path"))
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("bad pattern rejected");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("intent rule")));
}

#[test]
fn rejects_missing_skills_root() {
    let toml = minimal_toml("/definitely/not/a/real/skills/root");
    let err = GlobalConfig::from_toml_str(&toml).expect_err("missing root rejected");
    assert!(matches!(err, AppError::Config(msg) if msg.contains("skills_root")));
}

#[test]
fn rejects_malformed_toml() {
    let err = GlobalConfig::from_toml_str("skills_root = [").expect_err("malformed");
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
#[serial]
async fn api_key_falls_back_to_env_var() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));
    let mut config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    std::env::set_var("ANTHROPIC_API_KEY", "sk-test-from-env");
    config.load_credentials().await.expect("credentials load");
    std::env::remove_var("ANTHROPIC_API_KEY");

    assert_eq!(config.sidecar.api_key.as_deref(), Some("sk-test-from-env"));
}

#[tokio::test]
#[serial]
async fn missing_api_key_is_not_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));
    let mut config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    std::env::remove_var("ANTHROPIC_API_KEY");
    config.load_credentials().await.expect("credentials load");
    assert!(config.sidecar.api_key.is_none());
}
