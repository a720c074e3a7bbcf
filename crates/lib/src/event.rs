use crate::BalanceSnapshot;
use strum_macros::{Display, EnumString, EnumVariantNames, FromRepr};

/// Something that happens to the balance screen during a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioEvent {
    /// The balance screen is shown with the given server balance.
    Mount(BalanceSnapshot),
    /// The server balance was refreshed.
    Balance(BalanceSnapshot),
    /// The balance screen is left.
    Unmount,
    /// The user logs out, dropping the persisted balance.
    Logout,
    /// Nothing after this point is replayed.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumVariantNames, FromRepr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Mount,
    Balance,
    Unmount,
    Logout,
    End,
}

impl ScenarioEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ScenarioEvent::Mount(_) => EventKind::Mount,
            ScenarioEvent::Balance(_) => EventKind::Balance,
            ScenarioEvent::Unmount => EventKind::Unmount,
            ScenarioEvent::Logout => EventKind::Logout,
            ScenarioEvent::End => EventKind::End,
        }
    }

    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        match self {
            ScenarioEvent::Mount(snapshot) | ScenarioEvent::Balance(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    /// Epoch milliseconds.
    pub at: i64,
    pub event: ScenarioEvent,
}

impl TimedEvent {
    pub fn new(at: i64, event: ScenarioEvent) -> Self {
        Self { at, event }
    }
}
