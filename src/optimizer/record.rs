//! Restore records persisted in the change ledger
//!
//! Records are versioned JSON objects. The older delimited form
//! `"pid,priority|null,affinity|null"` is still accepted when reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::conditions::OptimizeConditions;
use crate::system::Priority;

/// Current record format version
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record '{0}'")]
    Malformed(String),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u32),

    #[error("record for PID {0} carries no previous value")]
    Empty(u32),

    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pre-mutation state of one process, as needed to undo the mutation.
///
/// At least one of `priority` / `affinity` is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessStateChange {
    pid: u32,
    priority: Option<Priority>,
    affinity: Option<usize>,
}

impl ProcessStateChange {
    fn new(
        pid: u32,
        priority: Option<Priority>,
        affinity: Option<usize>,
    ) -> Result<Self, RecordError> {
        if priority.is_none() && affinity.is_none() {
            return Err(RecordError::Empty(pid));
        }
        Ok(Self {
            pid,
            priority,
            affinity,
        })
    }

    pub fn priority_change(pid: u32, previous: Priority) -> Self {
        Self {
            pid,
            priority: Some(previous),
            affinity: None,
        }
    }

    pub fn affinity_change(pid: u32, previous: usize) -> Self {
        Self {
            pid,
            priority: None,
            affinity: Some(previous),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn previous_priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn previous_affinity(&self) -> Option<usize> {
        self.affinity
    }

    /// Legacy delimited form, used in logs.
    pub fn to_delimited(&self) -> String {
        let priority = self
            .priority
            .map(|p| p.class_value().to_string())
            .unwrap_or_else(|| "null".to_string());
        let affinity = self
            .affinity
            .map(|a| a.to_string())
            .unwrap_or_else(|| "null".to_string());
        format!("{},{},{}", self.pid, priority, affinity)
    }

    fn parse_delimited(input: &str) -> Result<Self, RecordError> {
        let malformed = || RecordError::Malformed(input.to_string());

        let mut sections = input.trim().split(',');
        let (Some(pid), Some(priority), Some(affinity), None) = (
            sections.next(),
            sections.next(),
            sections.next(),
            sections.next(),
        ) else {
            return Err(malformed());
        };

        let pid = pid.trim().parse::<u32>().map_err(|_| malformed())?;

        let priority = match priority.trim() {
            "null" => None,
            value => {
                let class = value.parse::<u32>().map_err(|_| malformed())?;
                Some(Priority::from_class_value(class).ok_or_else(malformed)?)
            }
        };

        let affinity = match affinity.trim() {
            "null" => None,
            value => Some(
                value
                    .parse::<usize>()
                    .or_else(|_| value.parse::<isize>().map(|v| v as usize))
                    .map_err(|_| malformed())?,
            ),
        };

        Self::new(pid, priority, affinity)
    }
}

/// One entry in the change ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    /// A mutation to undo
    Change(ProcessStateChange),
    /// Written first in every optimize pass; remembers the flags used
    Session { flags: u32 },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u32,
    #[serde(flatten)]
    record: LedgerRecord,
}

impl LedgerRecord {
    pub fn session(flags: OptimizeConditions) -> Self {
        LedgerRecord::Session { flags: flags.bits() }
    }

    /// Flags of the session record, if this is one.
    pub fn session_flags(&self) -> Option<OptimizeConditions> {
        match self {
            LedgerRecord::Session { flags } => Some(OptimizeConditions::from_bits_truncate(*flags)),
            LedgerRecord::Change(_) => None,
        }
    }

    pub fn to_value(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(&Envelope {
            v: RECORD_VERSION,
            record: self.clone(),
        })?)
    }

    pub fn parse(input: &str) -> Result<Self, RecordError> {
        if !input.trim_start().starts_with('{') {
            return ProcessStateChange::parse_delimited(input).map(LedgerRecord::Change);
        }

        let envelope: Envelope = serde_json::from_str(input)?;
        if envelope.v != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(envelope.v));
        }

        match envelope.record {
            LedgerRecord::Change(change) => {
                ProcessStateChange::new(change.pid, change.priority, change.affinity)
                    .map(LedgerRecord::Change)
            }
            session => Ok(session),
        }
    }
}
