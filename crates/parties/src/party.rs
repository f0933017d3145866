use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{Aggregate, AggregateRoot, DomainError, PartyId};
use poleyard_events::Event;

/// Party kind: pole supplier or treatment client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Supplier,
    Client,
}

/// Contact information for a party.
///
/// Used by collection logistics (rejects awaiting supplier pickup) and
/// delivery paperwork.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Party (supplier or client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    version: u64,
    registered: bool,
}

impl Party {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            kind: PartyKind::Supplier,
            name: String::new(),
            contact: ContactInfo::default(),
            version: 0,
            registered: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub party_id: PartyId,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateContact(UpdateContact),
}

/// Event: PartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub party_id: PartyId,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    ContactUpdated(ContactUpdated),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::ContactUpdated(_) => "parties.party.contact_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::ContactUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.registered = true;
            }
            PartyEvent::ContactUpdated(e) => {
                self.contact = e.contact.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => {
                if self.registered {
                    return Err(DomainError::conflict("party already registered"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
                    party_id: cmd.party_id,
                    kind: cmd.kind,
                    name: cmd.name.clone(),
                    contact: cmd.contact.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PartyCommand::UpdateContact(cmd) => {
                if !self.registered {
                    return Err(DomainError::not_found());
                }
                if self.id != cmd.party_id {
                    return Err(DomainError::invariant("party_id mismatch"));
                }
                Ok(vec![PartyEvent::ContactUpdated(ContactUpdated {
                    party_id: cmd.party_id,
                    contact: cmd.contact.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
