use serde::{Deserialize, Serialize};

/// Which side of the show a participant belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Female => write!(f, "F"),
            Gender::Male => write!(f, "M"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Active,
    Inactive,
}

/// A cast member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub status: ParticipantStatus,
}

impl Participant {
    pub fn new(name: impl Into<String>, gender: Gender) -> Self {
        Self {
            name: name.into(),
            gender,
            status: ParticipantStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }
}

/// Candidate relationship between a woman and a man, by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub woman: String,
    pub man: String,
}

impl Pair {
    pub fn new(woman: impl Into<String>, man: impl Into<String>) -> Self {
        Self {
            woman: woman.into(),
            man: man.into(),
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}", self.woman, self.man)
    }
}

/// A matching night: every couple sits together, only the number of
/// correct couples ("lights") is revealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingNight {
    pub name: String,
    pub pairs: Vec<Pair>,
    /// Reported number of correct pairs. Signed so that bad data entry
    /// reaches validation instead of failing deserialization.
    #[serde(rename = "totalLights")]
    pub lights: i32,
    #[serde(rename = "broadcastDate", default)]
    pub broadcast_date: Option<String>,
    #[serde(rename = "broadcastTime", default)]
    pub broadcast_time: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a matchbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    /// Confirmed perfect match
    Perfect,
    /// Confirmed not a match
    NoMatch,
    /// Couple sold the box, nothing was revealed
    Sold,
}

/// A single exact-pair reveal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchbox {
    pub woman: String,
    pub man: String,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "broadcastDate", default)]
    pub broadcast_date: Option<String>,
    #[serde(rename = "broadcastTime", default)]
    pub broadcast_time: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Matchbox {
    pub fn pair(&self) -> Pair {
        Pair::new(self.woman.clone(), self.man.clone())
    }
}

/// Penalty handed to a participant. Tracked by the store only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    #[serde(rename = "participantName")]
    pub participant_name: String,
    pub description: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}
