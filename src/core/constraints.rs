use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::broadcast::BroadcastResolver;
use crate::core::error::{TimeError, ValidationError};
use crate::models::{Gender, MatchType, Pair, Participant, ProbabilityInput};

/// Largest cast per side the search supports (one bit per man)
pub const MAX_GROUP_SIZE: usize = 64;

/// Point in time the constraints are evaluated at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPoint {
    /// Every recorded event
    Now,
    /// Nights aired at or before the instant, matchboxes aired strictly before it
    AsOf(NaiveDateTime),
}

/// One matching night reduced to indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightConstraint {
    pub name: String,
    pub instant: NaiveDateTime,
    /// Pairs as (woman index, man index)
    pub pairs: Vec<(usize, usize)>,
    pub lights: usize,
}

impl NightConstraint {
    /// partner[w] is the man woman `w` sat with, if she was seated
    pub fn partner_by_woman(&self, women: usize) -> Vec<Option<usize>> {
        let mut partner = vec![None; women];
        for &(w, m) in &self.pairs {
            partner[w] = Some(m);
        }
        partner
    }
}

/// Lights of a night already explained by earlier perfect matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightSummary {
    pub name: String,
    pub instant: NaiveDateTime,
    pub lights: usize,
    pub known_lights: usize,
    pub new_lights: usize,
}

/// Normalized constraint set over participant indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintModel {
    pub women: Vec<String>,
    pub men: Vec<String>,
    /// Pairs known to be perfect matches
    pub confirmed: BTreeSet<(usize, usize)>,
    /// Pairs known not to be perfect matches
    pub excluded: BTreeSet<(usize, usize)>,
    /// Nights in broadcast order
    pub nights: Vec<NightConstraint>,
    pub summaries: Vec<NightSummary>,
}

impl ConstraintModel {
    /// Participants per side
    pub fn size(&self) -> usize {
        self.women.len()
    }

    pub fn is_allowed(&self, woman: usize, man: usize) -> bool {
        !self.excluded.contains(&(woman, man))
    }

    pub fn pair(&self, (woman, man): (usize, usize)) -> Pair {
        Pair::new(self.women[woman].clone(), self.men[man].clone())
    }

    pub fn confirmed_pairs(&self) -> Vec<Pair> {
        self.confirmed.iter().map(|&p| self.pair(p)).collect()
    }

    pub fn excluded_pairs(&self) -> Vec<Pair> {
        self.excluded.iter().map(|&p| self.pair(p)).collect()
    }
}

/// Name lookup for one gender group
struct Roster {
    women: HashMap<String, usize>,
    men: HashMap<String, usize>,
}

impl Roster {
    fn index(&self, name: &str, gender: Gender, context: &str) -> Result<usize, ValidationError> {
        let (own, other) = match gender {
            Gender::Female => (&self.women, &self.men),
            Gender::Male => (&self.men, &self.women),
        };
        if let Some(&index) = own.get(name) {
            return Ok(index);
        }
        if other.contains_key(name) {
            return Err(ValidationError::WrongGender {
                name: name.to_string(),
                expected: gender,
                context: context.to_string(),
            });
        }
        Err(ValidationError::UnknownParticipant {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    fn pair(&self, woman: &str, man: &str, context: &str) -> Result<(usize, usize), ValidationError> {
        Ok((
            self.index(woman, Gender::Female, context)?,
            self.index(man, Gender::Male, context)?,
        ))
    }
}

fn time_error(context: &str) -> impl FnOnce(TimeError) -> ValidationError + '_ {
    move |source| ValidationError::Time {
        context: context.to_string(),
        source,
    }
}

/// Turns a raw snapshot into a validated [`ConstraintModel`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintBuilder {
    resolver: BroadcastResolver,
}

impl ConstraintBuilder {
    pub fn new(resolver: BroadcastResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &BroadcastResolver {
        &self.resolver
    }

    /// Validate the whole snapshot and build the constraints in effect at `at`
    ///
    /// Every record is validated, including those outside the evaluation
    /// window, so that bad data fails before any search starts.
    pub fn build(&self, input: &ProbabilityInput, at: EvaluationPoint) -> Result<ConstraintModel, ValidationError> {
        let (women, men) = split_groups(&input.participants)?;
        let roster = Roster {
            women: women.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect(),
            men: men.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect(),
        };

        // Matchboxes
        let mut boxes = Vec::with_capacity(input.matchboxes.len());
        for matchbox in &input.matchboxes {
            let context = format!("matchbox {} + {}", matchbox.woman, matchbox.man);
            let instant = self
                .resolver
                .effective_instant(matchbox)
                .map_err(time_error(&context))?;
            let pair = roster.pair(&matchbox.woman, &matchbox.man, &context)?;
            boxes.push((instant, pair, matchbox.match_type));
        }

        // Matching nights
        let mut nights = Vec::with_capacity(input.matching_nights.len());
        for night in &input.matching_nights {
            let context = format!("matching night '{}'", night.name);
            let instant = self
                .resolver
                .effective_instant(night)
                .map_err(time_error(&context))?;

            let mut seen_women = HashSet::new();
            let mut seen_men = HashSet::new();
            let mut pairs = Vec::with_capacity(night.pairs.len());
            for pair in &night.pairs {
                let (w, m) = roster.pair(&pair.woman, &pair.man, &context)?;
                if !seen_women.insert(w) {
                    return Err(ValidationError::DuplicateInNight {
                        name: pair.woman.clone(),
                        context,
                    });
                }
                if !seen_men.insert(m) {
                    return Err(ValidationError::DuplicateInNight {
                        name: pair.man.clone(),
                        context,
                    });
                }
                pairs.push((w, m));
            }

            if night.lights < 0 || night.lights as usize > pairs.len() {
                return Err(ValidationError::LightsOutOfRange {
                    context,
                    lights: night.lights,
                    pairs: pairs.len(),
                });
            }

            nights.push(NightConstraint {
                name: night.name.clone(),
                instant,
                pairs,
                lights: night.lights as usize,
            });
        }

        // Restrict to the evaluation window
        if let EvaluationPoint::AsOf(cutoff) = at {
            boxes.retain(|(instant, _, _)| *instant < cutoff);
            nights.retain(|night| night.instant <= cutoff);
        }
        nights.sort_by_key(|night| night.instant);

        let mut confirmed = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for &(_, pair, match_type) in &boxes {
            match match_type {
                MatchType::Perfect => {
                    confirmed.insert(pair);
                }
                MatchType::NoMatch => {
                    excluded.insert(pair);
                }
                MatchType::Sold => {}
            }
        }

        // A perfect match rules out every other partner of both participants
        for &(w, m) in &confirmed {
            for other in 0..men.len() {
                if other != m {
                    excluded.insert((w, other));
                }
            }
            for other in 0..women.len() {
                if other != w {
                    excluded.insert((other, m));
                }
            }
        }

        let summaries = nights
            .iter()
            .map(|night| {
                let known: HashSet<(usize, usize)> = boxes
                    .iter()
                    .filter(|(instant, _, t)| *t == MatchType::Perfect && *instant < night.instant)
                    .map(|(_, pair, _)| *pair)
                    .collect();
                let known_lights = night.pairs.iter().filter(|p| known.contains(p)).count();
                NightSummary {
                    name: night.name.clone(),
                    instant: night.instant,
                    lights: night.lights,
                    known_lights,
                    new_lights: night.lights.saturating_sub(known_lights),
                }
            })
            .collect();

        tracing::debug!(
            "Built constraints: {} per side, {} confirmed, {} excluded, {} nights",
            women.len(),
            confirmed.len(),
            excluded.len(),
            nights.len()
        );

        Ok(ConstraintModel {
            women,
            men,
            confirmed,
            excluded,
            nights,
            summaries,
        })
    }
}

/// Split participants into women and men, keeping input order
fn split_groups(participants: &[Participant]) -> Result<(Vec<String>, Vec<String>), ValidationError> {
    let mut women = Vec::new();
    let mut men = Vec::new();
    let mut seen: HashSet<(Gender, &str)> = HashSet::new();

    for participant in participants {
        if !seen.insert((participant.gender, participant.name.as_str())) {
            return Err(ValidationError::DuplicateName {
                name: participant.name.clone(),
                gender: participant.gender,
            });
        }
        match participant.gender {
            Gender::Female => women.push(participant.name.clone()),
            Gender::Male => men.push(participant.name.clone()),
        }
    }

    if women.len() != men.len() {
        return Err(ValidationError::UnequalGroups {
            women: women.len(),
            men: men.len(),
        });
    }
    if women.len() > MAX_GROUP_SIZE {
        return Err(ValidationError::RosterTooLarge {
            size: women.len(),
            max: MAX_GROUP_SIZE,
        });
    }

    Ok((women, men))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{cast, input, matchbox, night};
    use crate::core::broadcast::parse_broadcast;

    fn builder() -> ConstraintBuilder {
        ConstraintBuilder::default()
    }

    #[test]
    fn test_empty_history() {
        let model = builder().build(&input(3, vec![], vec![]), EvaluationPoint::Now).unwrap();
        assert_eq!(model.size(), 3);
        assert_eq!(model.women, vec!["Anna", "Bea", "Cleo"]);
        assert_eq!(model.men, vec!["Adam", "Ben", "Chris"]);
        assert!(model.confirmed.is_empty());
        assert!(model.excluded.is_empty());
        assert!(model.nights.is_empty());
    }

    #[test]
    fn test_perfect_match_excludes_row_and_column() {
        let data = input(3, vec![], vec![matchbox("Anna", "Ben", MatchType::Perfect, 2)]);
        let model = builder().build(&data, EvaluationPoint::Now).unwrap();

        assert_eq!(model.confirmed_pairs(), vec![Pair::new("Anna", "Ben")]);
        assert!(model.is_allowed(0, 1));
        assert!(!model.is_allowed(0, 0));
        assert!(!model.is_allowed(0, 2));
        assert!(!model.is_allowed(1, 1));
        assert!(!model.is_allowed(2, 1));
        assert!(model.is_allowed(1, 0));
        assert_eq!(model.excluded.len(), 4);
    }

    #[test]
    fn test_elimination_and_sold() {
        let data = input(
            3,
            vec![],
            vec![
                matchbox("Cleo", "Adam", MatchType::NoMatch, 2),
                matchbox("Bea", "Chris", MatchType::Sold, 3),
            ],
        );
        let model = builder().build(&data, EvaluationPoint::Now).unwrap();
        assert_eq!(model.excluded_pairs(), vec![Pair::new("Cleo", "Adam")]);
        assert!(model.confirmed.is_empty());
    }

    #[test]
    fn test_nights_sorted_by_broadcast() {
        let data = input(
            3,
            vec![
                night("MN2", 10, &[("Anna", "Adam")], 1),
                night("MN1", 3, &[("Anna", "Ben")], 0),
            ],
            vec![],
        );
        let model = builder().build(&data, EvaluationPoint::Now).unwrap();
        let names: Vec<_> = model.nights.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["MN1", "MN2"]);
        assert_eq!(model.nights[1].pairs, vec![(0, 0)]);
        assert_eq!(model.nights[1].partner_by_woman(3), vec![Some(0), None, None]);
    }

    #[test]
    fn test_as_of_window() {
        let data = input(
            3,
            vec![
                night("MN1", 3, &[("Anna", "Ben")], 0),
                night("MN2", 10, &[("Anna", "Adam")], 1),
            ],
            vec![
                matchbox("Bea", "Ben", MatchType::Perfect, 3),
                matchbox("Cleo", "Chris", MatchType::NoMatch, 1),
            ],
        );
        // Night 1 airs 2024-03-03 20:15, the perfect matchbox at the same instant
        let cutoff = parse_broadcast("2024-03-03", "20:15").unwrap();
        let model = builder().build(&data, EvaluationPoint::AsOf(cutoff)).unwrap();

        assert_eq!(model.nights.len(), 1);
        assert!(model.confirmed.is_empty());
        assert_eq!(model.excluded_pairs(), vec![Pair::new("Cleo", "Chris")]);
    }

    #[test]
    fn test_night_summaries_count_known_lights() {
        let data = input(
            3,
            vec![
                night("MN1", 3, &[("Anna", "Adam"), ("Bea", "Ben"), ("Cleo", "Chris")], 1),
                night("MN2", 10, &[("Anna", "Adam"), ("Bea", "Chris"), ("Cleo", "Ben")], 2),
            ],
            vec![matchbox("Anna", "Adam", MatchType::Perfect, 5)],
        );
        let model = builder().build(&data, EvaluationPoint::Now).unwrap();

        assert_eq!(model.summaries[0].known_lights, 0);
        assert_eq!(model.summaries[0].new_lights, 1);
        assert_eq!(model.summaries[1].known_lights, 1);
        assert_eq!(model.summaries[1].new_lights, 1);
    }

    #[test]
    fn test_lights_out_of_range() {
        let too_many = input(3, vec![night("MN1", 3, &[("Anna", "Adam")], 2)], vec![]);
        assert!(matches!(
            builder().build(&too_many, EvaluationPoint::Now),
            Err(ValidationError::LightsOutOfRange { lights: 2, pairs: 1, .. })
        ));

        let negative = input(3, vec![night("MN1", 3, &[("Anna", "Adam")], -1)], vec![]);
        assert!(matches!(
            builder().build(&negative, EvaluationPoint::Now),
            Err(ValidationError::LightsOutOfRange { lights: -1, .. })
        ));
    }

    #[test]
    fn test_duplicate_participant_in_night() {
        let data = input(3, vec![night("MN1", 3, &[("Anna", "Adam"), ("Bea", "Adam")], 0)], vec![]);
        assert_eq!(
            builder().build(&data, EvaluationPoint::Now),
            Err(ValidationError::DuplicateInNight {
                name: "Adam".to_string(),
                context: "matching night 'MN1'".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_and_wrong_gender() {
        let unknown = input(2, vec![], vec![matchbox("Zoe", "Adam", MatchType::NoMatch, 1)]);
        assert!(matches!(
            builder().build(&unknown, EvaluationPoint::Now),
            Err(ValidationError::UnknownParticipant { .. })
        ));

        let swapped = input(2, vec![], vec![matchbox("Adam", "Anna", MatchType::NoMatch, 1)]);
        assert!(matches!(
            builder().build(&swapped, EvaluationPoint::Now),
            Err(ValidationError::WrongGender { expected: Gender::Female, .. })
        ));
    }

    #[test]
    fn test_group_validation() {
        let mut participants = cast(2);
        participants.push(Participant::new("Extra", Gender::Female));
        let data = ProbabilityInput {
            participants,
            ..Default::default()
        };
        assert_eq!(
            builder().build(&data, EvaluationPoint::Now),
            Err(ValidationError::UnequalGroups { women: 3, men: 2 })
        );

        let mut participants = cast(2);
        participants.push(Participant::new("Anna", Gender::Female));
        let data = ProbabilityInput {
            participants,
            ..Default::default()
        };
        assert!(matches!(
            builder().build(&data, EvaluationPoint::Now),
            Err(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_bad_broadcast_time_is_validation_error() {
        let mut bad = night("MN1", 3, &[("Anna", "Adam")], 0);
        bad.broadcast_time = Some("25:00".to_string());
        let data = input(2, vec![bad], vec![]);
        assert!(matches!(
            builder().build(&data, EvaluationPoint::Now),
            Err(ValidationError::Time { source: TimeError::HourOutOfRange(25), .. })
        ));
    }
}
