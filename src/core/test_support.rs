//! Shared builders for the engine's unit tests

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{Gender, MatchType, Matchbox, MatchingNight, Pair, Participant, ProbabilityInput};

pub const WOMEN: [&str; 12] = [
    "Anna", "Bea", "Cleo", "Dana", "Eva", "Fay", "Gina", "Hanna", "Ida", "Jana", "Kim", "Lea",
];
pub const MEN: [&str; 12] = [
    "Adam", "Ben", "Chris", "David", "Emil", "Finn", "Gabe", "Henri", "Ivo", "Jonas", "Kai", "Leon",
];

/// `n` women followed by `n` men
pub fn cast(n: usize) -> Vec<Participant> {
    WOMEN[..n]
        .iter()
        .map(|name| Participant::new(*name, Gender::Female))
        .chain(MEN[..n].iter().map(|name| Participant::new(*name, Gender::Male)))
        .collect()
}

/// Night aired on 2024-03-`day` at the default time
pub fn night(name: &str, day: u32, pairs: &[(&str, &str)], lights: i32) -> MatchingNight {
    MatchingNight {
        name: name.to_string(),
        pairs: pairs.iter().map(|(w, m)| Pair::new(*w, *m)).collect(),
        lights,
        broadcast_date: Some(format!("2024-03-{:02}", day)),
        broadcast_time: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    }
}

/// Matchbox aired on 2024-03-`day` at the default time
pub fn matchbox(woman: &str, man: &str, match_type: MatchType, day: u32) -> Matchbox {
    Matchbox {
        woman: woman.to_string(),
        man: man.to_string(),
        match_type,
        broadcast_date: Some(format!("2024-03-{:02}", day)),
        broadcast_time: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    }
}

pub fn input(n: usize, matching_nights: Vec<MatchingNight>, matchboxes: Vec<Matchbox>) -> ProbabilityInput {
    ProbabilityInput {
        participants: cast(n),
        matching_nights,
        matchboxes,
    }
}

/// `n` couples whose hidden solution pairs the i-th woman with the i-th man,
/// with `nights` randomly seated matching nights lit accordingly
pub fn seated_season(n: usize, nights: usize, seed: u64) -> ProbabilityInput {
    let mut rng = StdRng::seed_from_u64(seed);
    let matching_nights = (0..nights)
        .map(|k| {
            let mut seating: Vec<usize> = (0..n).collect();
            seating.shuffle(&mut rng);
            let pairs: Vec<(&str, &str)> = seating.iter().enumerate().map(|(w, &m)| (WOMEN[w], MEN[m])).collect();
            let lights = seating.iter().enumerate().filter(|&(w, &m)| w == m).count() as i32;
            night(&format!("MN{}", k + 1), 1 + 3 * k as u32, &pairs, lights)
        })
        .collect();
    input(n, matching_nights, vec![])
}
