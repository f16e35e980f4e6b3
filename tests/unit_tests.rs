// Unit tests for the probability engine's public API

use ayto_calc::config::EngineSettings;
use ayto_calc::core::{
    parse_broadcast, BroadcastResolver, CancelToken, EngineError, EvaluationPoint, ProbabilityEngine, ValidationError,
};
use ayto_calc::models::{
    EstimationMethod, Gender, MatchType, Matchbox, MatchingNight, Pair, Participant, ProbabilityInput,
};
use chrono::{TimeZone, Utc};

const WOMEN: [&str; 8] = ["Anna", "Bea", "Cleo", "Dana", "Eva", "Fay", "Gina", "Hanna"];
const MEN: [&str; 8] = ["Adam", "Ben", "Chris", "David", "Emil", "Finn", "Gabe", "Henri"];

fn create_input(n: usize) -> ProbabilityInput {
    let participants = WOMEN[..n]
        .iter()
        .map(|name| Participant::new(*name, Gender::Female))
        .chain(MEN[..n].iter().map(|name| Participant::new(*name, Gender::Male)))
        .collect();
    ProbabilityInput {
        participants,
        ..ProbabilityInput::default()
    }
}

fn create_night(name: &str, date: &str, pairs: &[(&str, &str)], lights: i32) -> MatchingNight {
    MatchingNight {
        name: name.to_string(),
        pairs: pairs.iter().map(|(w, m)| Pair::new(*w, *m)).collect(),
        lights,
        broadcast_date: Some(date.to_string()),
        broadcast_time: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
    }
}

fn create_matchbox(woman: &str, man: &str, match_type: MatchType, date: &str) -> Matchbox {
    Matchbox {
        woman: woman.to_string(),
        man: man.to_string(),
        match_type,
        broadcast_date: Some(date.to_string()),
        broadcast_time: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
    }
}

fn assert_sums_to_one(result: &ayto_calc::models::ProbabilityResult) {
    for woman in &result.women {
        assert!((result.row_sum(woman) - 1.0).abs() < 1e-9, "row {} sums to {}", woman, result.row_sum(woman));
    }
    for man in &result.men {
        assert!((result.column_sum(man) - 1.0).abs() < 1e-9, "column {} sums to {}", man, result.column_sum(man));
    }
}

#[test]
fn test_uniform_without_constraints() {
    let result = ProbabilityEngine::with_default_settings()
        .calculate(&create_input(5))
        .unwrap();

    assert_eq!(result.permutation_count, 120);
    for woman in &WOMEN[..5] {
        for man in &MEN[..5] {
            assert!((result.get(woman, man).unwrap() - 0.2).abs() < 1e-12);
        }
    }
}

#[test]
fn test_rows_and_columns_sum_to_one() {
    let mut input = create_input(6);
    input.matching_nights = vec![
        create_night(
            "MN1",
            "2024-03-03",
            &[("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris"), ("Dana", "David"), ("Eva", "Emil"), ("Fay", "Finn")],
            2,
        ),
        create_night(
            "MN2",
            "2024-03-10",
            &[("Anna", "Ben"), ("Bea", "Chris"), ("Cleo", "David"), ("Dana", "Emil"), ("Eva", "Finn"), ("Fay", "Adam")],
            1,
        ),
    ];
    input.matchboxes = vec![create_matchbox("Cleo", "Chris", MatchType::NoMatch, "2024-03-05")];

    let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
    assert_eq!(result.method, EstimationMethod::Exact);
    assert!(result.permutation_count > 0);
    assert_sums_to_one(&result);
    assert_eq!(result.get("Cleo", "Chris"), Some(0.0));
}

#[test]
fn test_perfect_match_pins_row_and_column() {
    let mut input = create_input(4);
    input.matchboxes = vec![create_matchbox("Bea", "Chris", MatchType::Perfect, "2024-03-05")];

    let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
    assert_eq!(result.permutation_count, 6);
    assert_eq!(result.get("Bea", "Chris"), Some(1.0));
    for other in ["Adam", "Ben", "David"] {
        assert_eq!(result.get("Bea", other), Some(0.0));
    }
    for other in ["Anna", "Cleo", "Dana"] {
        assert_eq!(result.get(other, "Chris"), Some(0.0));
    }
    assert_eq!(result.best_match_for("Bea"), Some(("Chris", 1.0)));
}

#[test]
fn test_no_match_pins_zero() {
    let mut input = create_input(3);
    input.matchboxes = vec![create_matchbox("Anna", "Adam", MatchType::NoMatch, "2024-03-05")];

    let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
    assert_eq!(result.permutation_count, 4);
    assert_eq!(result.get("Anna", "Adam"), Some(0.0));
    assert!((result.get("Anna", "Ben").unwrap() - 0.5).abs() < 1e-12);
}

#[test]
fn test_sold_matchbox_reveals_nothing() {
    let mut input = create_input(3);
    input.matchboxes = vec![create_matchbox("Anna", "Adam", MatchType::Sold, "2024-03-05")];

    let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
    assert_eq!(result.permutation_count, 6);
}

#[test]
fn test_one_light_night_leaves_three_permutations() {
    let mut input = create_input(3);
    input.matching_nights = vec![create_night(
        "MN1",
        "2024-03-03",
        &[("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris")],
        1,
    )];

    let result = ProbabilityEngine::with_default_settings().calculate(&input).unwrap();
    assert_eq!(result.permutation_count, 3);
    for (woman, man) in [("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris")] {
        assert!((result.get(woman, man).unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }
    assert_sums_to_one(&result);
}

#[test]
fn test_contradiction_is_infeasible() {
    let mut input = create_input(3);
    input.matchboxes = vec![
        create_matchbox("Anna", "Adam", MatchType::Perfect, "2024-03-05"),
        create_matchbox("Anna", "Adam", MatchType::NoMatch, "2024-03-06"),
    ];

    let err = ProbabilityEngine::with_default_settings().calculate(&input).unwrap_err();
    assert!(matches!(err, EngineError::Infeasible(_)));
}

#[test]
fn test_unknown_participant_fails_validation() {
    let mut input = create_input(3);
    input.matchboxes = vec![create_matchbox("Zoe", "Adam", MatchType::NoMatch, "2024-03-05")];

    let err = ProbabilityEngine::with_default_settings().calculate(&input).unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::UnknownParticipant { .. })));
}

#[test]
fn test_swapped_gender_fails_validation() {
    let mut input = create_input(3);
    input.matching_nights = vec![create_night("MN1", "2024-03-03", &[("Adam", "Anna")], 0)];

    let err = ProbabilityEngine::with_default_settings().calculate(&input).unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::WrongGender { .. })));
}

#[test]
fn test_progress_is_monotone_and_completes() {
    let mut input = create_input(5);
    input.matching_nights = vec![create_night(
        "MN1",
        "2024-03-03",
        &[("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris"), ("Dana", "David"), ("Eva", "Emil")],
        2,
    )];

    let mut updates: Vec<(f64, String)> = Vec::new();
    let mut sink = |progress: f64, step: &str| updates.push((progress, step.to_string()));
    ProbabilityEngine::with_default_settings()
        .run(&input, &mut sink, &CancelToken::never())
        .unwrap();

    assert!(!updates.is_empty());
    assert_eq!(updates[0].1, "validating input");
    assert!(updates.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(updates.last().map(|(p, _)| *p), Some(1.0));
    assert!(updates.iter().any(|(_, step)| step == "enumerating permutations"));
}

#[test]
fn test_repeat_runs_are_identical() {
    let mut input = create_input(8);
    let seating: Vec<(&str, &str)> = WOMEN.iter().copied().zip(MEN.iter().copied()).collect();
    input.matching_nights = vec![create_night("MN1", "2024-03-03", &seating, 2)];

    let exact = ProbabilityEngine::with_default_settings();
    assert_eq!(exact.calculate(&input).unwrap(), exact.calculate(&input).unwrap());

    let sampled = ProbabilityEngine::new(EngineSettings {
        node_budget: 10,
        samples: 3_000,
        burn_in: 500,
        ..EngineSettings::default()
    })
    .unwrap();
    let first = sampled.calculate(&input).unwrap();
    assert_eq!(first.method, EstimationMethod::Sampled);
    assert_eq!(first, sampled.calculate(&input).unwrap());
    assert_sums_to_one(&first);
}

#[test]
fn test_evaluation_point_ignores_later_events() {
    let mut input = create_input(3);
    input.matching_nights = vec![create_night(
        "MN1",
        "2024-03-03",
        &[("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris")],
        1,
    )];
    input.matchboxes = vec![create_matchbox("Anna", "Adam", MatchType::Perfect, "2024-03-05")];

    let engine = ProbabilityEngine::with_default_settings();
    let at_night = parse_broadcast("2024-03-03", "20:15").unwrap();
    let early = engine
        .run_at(&input, EvaluationPoint::AsOf(at_night), &mut |_: f64, _: &str| {}, &CancelToken::never())
        .unwrap();
    assert_eq!(early.permutation_count, 3);

    let now = engine.calculate(&input).unwrap();
    assert_eq!(now.permutation_count, 1);
    assert_eq!(now.get("Bea", "Chris"), Some(1.0));
}

#[test]
fn test_broadcast_resolver_orders_by_air_time() {
    let resolver = BroadcastResolver::default();
    let mut late = create_night("MN2", "2024-03-10", &[], 0);
    late.broadcast_time = Some("21:00".to_string());
    let mut undated = create_night("MN0", "2024-03-01", &[], 0);
    undated.broadcast_date = None;

    let sorted = resolver
        .sort_oldest_first(&[late, create_night("MN1", "2024-03-03", &[], 0), undated])
        .unwrap();
    let names: Vec<_> = sorted.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["MN0", "MN1", "MN2"]);
}
