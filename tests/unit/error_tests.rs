//! `AppError` display format.

use chrono::{TimeZone, Utc};
use skillforge::models::lock::SkillLock;
use skillforge::AppError;

#[test]
fn display_is_kind_prefixed() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Agent("spawn failed".into()), "agent: spawn failed"),
        (AppError::Io("denied".into()), "io: denied"),
        (AppError::NotFound("Q9".into()), "not found: Q9"),
        (
            AppError::InvalidTransition("pending -> completed".into()),
            "invalid transition: pending -> completed",
        ),
        (AppError::Document("no choice Z".into()), "document: no choice Z"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::Agent("line too long".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn lock_contention_names_the_holder() {
    let holder = SkillLock {
        skill_name: "sales-pipeline".into(),
        instance_id: "desk-2".into(),
        pid: 4242,
        acquired_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    };
    let text = AppError::LockContention(holder).to_string();

    assert!(text.starts_with("lock contention:"));
    assert!(text.contains("sales-pipeline"));
    assert!(text.contains("desk-2"));
    assert!(text.contains("4242"));
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn json_errors_convert_to_agent_errors() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: AppError = json_err.into();
    assert!(err.to_string().starts_with("agent: json:"));
}
