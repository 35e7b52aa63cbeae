//! Intent classification from free-text signals.

use skillforge::config::IntentRuleConfig;
use skillforge::workflow::{Intent, IntentClassifier};

#[test]
fn common_signals_map_to_expected_intents() {
    let classifier = IntentClassifier::default();
    let cases = [
        ("start fresh", Intent::StartFresh),
        ("Please reset everything", Intent::StartFresh),
        ("just validate it", Intent::ValidateOnly),
        ("validate", Intent::ValidateOnly),
        ("improve the examples section", Intent::Improve),
        ("refine the tone", Intent::Improve),
        ("express", Intent::Express),
        ("skip the questions and use the recommendations", Intent::Express),
        ("continue", Intent::Resume),
        ("I've answered the questions", Intent::Resume),
        ("build a skill for sales pipelines", Intent::NewSkill),
        ("what does the decisions file contain?", Intent::ProcessQuestion),
        ("Why was stage B chosen", Intent::ProcessQuestion),
    ];

    for (signal, expected) in cases {
        assert_eq!(
            classifier.classify(signal, true),
            expected,
            "signal {signal:?}"
        );
    }
}

#[test]
fn classification_is_case_insensitive() {
    let classifier = IntentClassifier::default();
    assert_eq!(classifier.classify("START OVER", true), Intent::StartFresh);
    assert_eq!(classifier.classify("Continue", true), Intent::Resume);
}

#[test]
fn how_question_about_building_is_a_question() {
    let classifier = IntentClassifier::default();
    assert_eq!(
        classifier.classify("how do I build the reference files?", true),
        Intent::ProcessQuestion
    );
}

#[test]
fn blank_signal_defaults_by_session_presence() {
    let classifier = IntentClassifier::default();
    assert_eq!(classifier.classify("", true), Intent::Resume);
    assert_eq!(classifier.classify("   ", false), Intent::NewSkill);
}

#[test]
fn unmatched_signal_defaults_by_session_presence() {
    let classifier = IntentClassifier::default();
    assert_eq!(classifier.classify("sales pipeline", true), Intent::Resume);
    assert_eq!(classifier.classify("sales pipeline", false), Intent::NewSkill);
}

#[test]
fn configured_rules_take_precedence() {
    let rules = [IntentRuleConfig {
        pattern: r"\bship it\b".into(),
        intent: Intent::Express,
    }];
    let classifier = IntentClassifier::new(&rules);

    assert_eq!(classifier.classify("ok ship it", true), Intent::Express);
    assert_eq!(classifier.classify("continue", true), Intent::Resume);
}

#[test]
fn configured_rule_can_override_builtin() {
    let rules = [IntentRuleConfig {
        pattern: r"^continue$".into(),
        intent: Intent::ValidateOnly,
    }];
    let classifier = IntentClassifier::new(&rules);
    assert_eq!(classifier.classify("continue", true), Intent::ValidateOnly);
}

#[test]
fn invalid_configured_pattern_is_skipped() {
    let rules = [IntentRuleConfig {
        pattern: "(unclosed".into(),
        intent: Intent::StartFresh,
    }];
    let classifier = IntentClassifier::new(&rules);
    assert_eq!(classifier.classify("continue", true), Intent::Resume);
}

#[test]
fn intent_parses_from_wire_name() {
    assert_eq!("validate_only".parse::<Intent>().unwrap(), Intent::ValidateOnly);
    assert!("launch".parse::<Intent>().is_err());
}
