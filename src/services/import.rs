//! Strict parsing of the tracker's JSON export.
//!
//! Every record is validated before it becomes a typed model: missing or
//! empty names, unknown genders, statuses or match types and malformed
//! broadcast dates are rejected instead of being defaulted.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::core::broadcast::{parse_date, parse_time};
use crate::core::error::TimeError;
use crate::models::{
    Gender, MatchType, Matchbox, MatchingNight, Pair, Participant, ParticipantStatus, Penalty, ProbabilityInput,
};

/// Errors that can occur while importing an export file
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {context}: {source}")]
    Invalid {
        context: String,
        #[source]
        source: validator::ValidationErrors,
    },

    #[error("Unrecognized gender '{value}' for participant '{name}'")]
    UnknownGender { name: String, value: String },

    #[error("Unrecognized status '{value}' for participant '{name}'")]
    UnknownStatus { name: String, value: String },

    #[error("Unrecognized match type '{value}' in {context}")]
    UnknownMatchType { value: String, context: String },

    #[error("Invalid broadcast time in {context}: {source}")]
    Time {
        context: String,
        #[source]
        source: TimeError,
    },
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RawParticipant {
    #[validate(custom(function = "not_blank"))]
    name: String,
    gender: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct RawPair {
    #[validate(custom(function = "not_blank"))]
    woman: String,
    #[validate(custom(function = "not_blank"))]
    man: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RawMatchingNight {
    #[validate(custom(function = "not_blank"))]
    name: String,
    pairs: Vec<RawPair>,
    #[validate(range(min = 0))]
    total_lights: i32,
    #[serde(default)]
    broadcast_date: Option<String>,
    #[serde(default)]
    broadcast_time: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RawMatchbox {
    #[validate(custom(function = "not_blank"))]
    woman: String,
    #[validate(custom(function = "not_blank"))]
    man: String,
    match_type: String,
    #[serde(default)]
    broadcast_date: Option<String>,
    #[serde(default)]
    broadcast_time: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RawPenalty {
    #[validate(custom(function = "not_blank"))]
    participant_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExport {
    participants: Vec<RawParticipant>,
    #[serde(default)]
    matching_nights: Vec<RawMatchingNight>,
    #[serde(default)]
    matchboxes: Vec<RawMatchbox>,
    #[serde(default)]
    penalties: Vec<RawPenalty>,
}

/// Typed, validated contents of an export file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedData {
    pub participants: Vec<Participant>,
    pub matching_nights: Vec<MatchingNight>,
    pub matchboxes: Vec<Matchbox>,
    pub penalties: Vec<Penalty>,
}

impl ImportedData {
    /// Probability input built from the imported records
    pub fn into_input(self) -> ProbabilityInput {
        ProbabilityInput {
            participants: self.participants,
            matching_nights: self.matching_nights,
            matchboxes: self.matchboxes,
        }
    }
}

/// Parse an export document
pub fn parse_export(json: &str) -> Result<ImportedData, ImportError> {
    let raw: RawExport = serde_json::from_str(json)?;

    let participants = raw
        .participants
        .into_iter()
        .map(convert_participant)
        .collect::<Result<Vec<_>, _>>()?;
    let matching_nights = raw
        .matching_nights
        .into_iter()
        .map(convert_night)
        .collect::<Result<Vec<_>, _>>()?;
    let matchboxes = raw
        .matchboxes
        .into_iter()
        .map(convert_matchbox)
        .collect::<Result<Vec<_>, _>>()?;
    let penalties = raw
        .penalties
        .into_iter()
        .map(convert_penalty)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        "Imported {} participants, {} matching nights, {} matchboxes, {} penalties",
        participants.len(),
        matching_nights.len(),
        matchboxes.len(),
        penalties.len()
    );

    Ok(ImportedData {
        participants,
        matching_nights,
        matchboxes,
        penalties,
    })
}

/// Read and parse an export file
pub fn load_export<P: AsRef<Path>>(path: P) -> Result<ImportedData, ImportError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    tracing::debug!("Loading export from {}", path.as_ref().display());
    parse_export(&text)
}

/// Map a gender label to a side of the show
pub fn parse_gender(value: &str) -> Option<Gender> {
    match value.trim().to_lowercase().as_str() {
        "f" | "female" | "w" | "woman" | "frau" => Some(Gender::Female),
        "m" | "male" | "man" | "mann" => Some(Gender::Male),
        _ => None,
    }
}

fn validate<T: Validate>(record: &T, context: impl Into<String>) -> Result<(), ImportError> {
    record.validate().map_err(|source| ImportError::Invalid {
        context: context.into(),
        source,
    })
}

/// Names must carry at least one visible character
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Normalize and check optional broadcast fields
fn broadcast_fields(
    date: Option<String>,
    time: Option<String>,
    context: &str,
) -> Result<(Option<String>, Option<String>), ImportError> {
    let date = non_empty(date);
    let time = non_empty(time);
    let check = |result: Result<(), TimeError>| {
        result.map_err(|source| ImportError::Time {
            context: context.to_string(),
            source,
        })
    };
    if let Some(d) = &date {
        check(parse_date(d).map(|_| ()))?;
    }
    if let Some(t) = &time {
        check(parse_time(t).map(|_| ()))?;
    }
    Ok((date, time))
}

fn convert_participant(raw: RawParticipant) -> Result<Participant, ImportError> {
    validate(&raw, "participant")?;

    let gender = parse_gender(&raw.gender).ok_or_else(|| ImportError::UnknownGender {
        name: raw.name.clone(),
        value: raw.gender.clone(),
    })?;
    let status = match non_empty(raw.status).as_deref().map(str::to_lowercase).as_deref() {
        None | Some("active") => ParticipantStatus::Active,
        Some("inactive") => ParticipantStatus::Inactive,
        Some(other) => {
            return Err(ImportError::UnknownStatus {
                name: raw.name,
                value: other.to_string(),
            })
        }
    };

    Ok(Participant {
        name: raw.name.trim().to_string(),
        gender,
        status,
    })
}

fn convert_night(raw: RawMatchingNight) -> Result<MatchingNight, ImportError> {
    let context = format!("matching night '{}'", raw.name);
    validate(&raw, context.clone())?;
    for pair in &raw.pairs {
        validate(pair, context.clone())?;
    }
    let (broadcast_date, broadcast_time) = broadcast_fields(raw.broadcast_date, raw.broadcast_time, &context)?;

    Ok(MatchingNight {
        name: raw.name,
        pairs: raw
            .pairs
            .into_iter()
            .map(|p| Pair::new(p.woman.trim(), p.man.trim()))
            .collect(),
        lights: raw.total_lights,
        broadcast_date,
        broadcast_time,
        created_at: raw.created_at,
    })
}

fn convert_matchbox(raw: RawMatchbox) -> Result<Matchbox, ImportError> {
    let context = format!("matchbox {} + {}", raw.woman, raw.man);
    validate(&raw, context.clone())?;

    let match_type = match raw.match_type.trim() {
        "perfect" => MatchType::Perfect,
        "no-match" => MatchType::NoMatch,
        "sold" => MatchType::Sold,
        other => {
            return Err(ImportError::UnknownMatchType {
                value: other.to_string(),
                context,
            })
        }
    };
    let (broadcast_date, broadcast_time) = broadcast_fields(raw.broadcast_date, raw.broadcast_time, &context)?;

    Ok(Matchbox {
        woman: raw.woman.trim().to_string(),
        man: raw.man.trim().to_string(),
        match_type,
        broadcast_date,
        broadcast_time,
        created_at: raw.created_at,
    })
}

fn convert_penalty(raw: RawPenalty) -> Result<Penalty, ImportError> {
    validate(&raw, "penalty")?;
    let date = non_empty(raw.date);
    if let Some(d) = &date {
        parse_date(d).map_err(|source| ImportError::Time {
            context: format!("penalty for {}", raw.participant_name),
            source,
        })?;
    }

    Ok(Penalty {
        participant_name: raw.participant_name,
        description: raw.description,
        date,
        created_at: raw.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "version": "2.1.0",
        "participants": [
            { "id": 1, "name": "Anna", "gender": "F" },
            { "id": 2, "name": "Bea", "gender": "female", "status": "inactive" },
            { "id": 3, "name": "Adam", "gender": "M", "status": "active" },
            { "id": 4, "name": "Ben", "gender": "m" }
        ],
        "matchingNights": [
            {
                "name": "MN1",
                "pairs": [ { "woman": "Anna", "man": "Adam" }, { "woman": "Bea", "man": "Ben" } ],
                "totalLights": 0,
                "broadcastDate": "2024-03-03",
                "broadcastTime": "",
                "createdAt": "2024-03-01T10:00:00Z"
            }
        ],
        "matchboxes": [
            {
                "woman": "Anna",
                "man": "Ben",
                "matchType": "perfect",
                "broadcastDate": "2024-03-05",
                "broadcastTime": "21:00",
                "createdAt": "2024-03-01T10:00:00Z"
            }
        ],
        "penalties": [
            { "participantName": "Ben", "description": "Phone in the villa", "createdAt": "2024-03-02T08:00:00Z" }
        ]
    }"#;

    #[test]
    fn test_parse_export() {
        let data = parse_export(EXPORT).unwrap();
        assert_eq!(data.participants.len(), 4);
        assert_eq!(data.participants[1].gender, Gender::Female);
        assert_eq!(data.participants[1].status, ParticipantStatus::Inactive);
        assert_eq!(data.participants[3].gender, Gender::Male);

        let night = &data.matching_nights[0];
        assert_eq!(night.pairs[1], Pair::new("Bea", "Ben"));
        assert_eq!(night.broadcast_time, None);

        assert_eq!(data.matchboxes[0].match_type, MatchType::Perfect);
        assert_eq!(data.penalties[0].participant_name, "Ben");

        let input = data.into_input();
        assert_eq!(input.matching_nights.len(), 1);
    }

    #[test]
    fn test_unknown_gender_fails_loudly() {
        let json = r#"{ "participants": [ { "name": "Alex", "gender": "x" } ] }"#;
        match parse_export(json) {
            Err(ImportError::UnknownGender { name, value }) => {
                assert_eq!(name, "Alex");
                assert_eq!(value, "x");
            }
            other => panic!("expected unknown gender, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_match_type() {
        let json = r#"{
            "participants": [],
            "matchboxes": [ { "woman": "Anna", "man": "Adam", "matchType": "maybe", "createdAt": "2024-03-01T10:00:00Z" } ]
        }"#;
        assert!(matches!(parse_export(json), Err(ImportError::UnknownMatchType { .. })));
    }

    #[test]
    fn test_field_validation() {
        let json = r#"{ "participants": [ { "name": "", "gender": "F" } ] }"#;
        assert!(matches!(parse_export(json), Err(ImportError::Invalid { .. })));

        let json = r#"{ "participants": [ { "name": "   ", "gender": "F" } ] }"#;
        assert!(matches!(parse_export(json), Err(ImportError::Invalid { .. })));

        let json = r#"{
            "participants": [],
            "matchingNights": [ { "name": "MN1", "pairs": [ { "woman": "Anna", "man": " " } ], "totalLights": 0, "createdAt": "2024-03-01T10:00:00Z" } ]
        }"#;
        assert!(matches!(parse_export(json), Err(ImportError::Invalid { .. })));

        let json = r#"{
            "participants": [],
            "matchingNights": [ { "name": "MN1", "pairs": [], "totalLights": -2, "createdAt": "2024-03-01T10:00:00Z" } ]
        }"#;
        assert!(matches!(parse_export(json), Err(ImportError::Invalid { .. })));
    }

    #[test]
    fn test_malformed_broadcast_date() {
        let json = r#"{
            "participants": [],
            "matchingNights": [ { "name": "MN1", "pairs": [], "totalLights": 0, "broadcastDate": "03.03.2024", "createdAt": "2024-03-01T10:00:00Z" } ]
        }"#;
        assert!(matches!(
            parse_export(json),
            Err(ImportError::Time { source: TimeError::InvalidDate(_), .. })
        ));
    }

    #[test]
    fn test_gender_aliases() {
        assert_eq!(parse_gender(" W "), Some(Gender::Female));
        assert_eq!(parse_gender("Male"), Some(Gender::Male));
        assert_eq!(parse_gender("d"), None);
    }
}
