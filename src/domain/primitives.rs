//! Domain primitives: ParticipantId, Role, Participant.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a passbook holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn generate() -> Self {
        ParticipantId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ParticipantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ParticipantId)
    }
}

/// What kind of passbook a participant holds. Never changes after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Vendor,
    Club,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Vendor => "vendor",
            Role::Club => "club",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "vendor" => Ok(Role::Vendor),
            "club" => Ok(Role::Club),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A passbook holder: member, vendor, the club itself, or a system account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: Role,
    pub active: bool,
}

impl Participant {
    pub fn new(role: Role) -> Self {
        Participant {
            id: ParticipantId::generate(),
            role,
            active: true,
        }
    }

    pub fn with_id(id: ParticipantId, role: Role) -> Self {
        Participant {
            id,
            role,
            active: true,
        }
    }
}
