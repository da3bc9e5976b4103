use crate::model::Account;
use serde::{Deserialize, Serialize};

/// Per-account, per-feature download policy. The wire format is a
/// nullable boolean; the tri-state enum exists so that "no override" and
/// "force off" can never be confused inside the client.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PreferenceOverride {
    #[default]
    Inherit,
    ForceOn,
    ForceOff,
}

impl PreferenceOverride {
    pub fn from_wire(value: Option<bool>) -> Self {
        match value {
            None => PreferenceOverride::Inherit,
            Some(true) => PreferenceOverride::ForceOn,
            Some(false) => PreferenceOverride::ForceOff,
        }
    }

    pub fn to_wire(self) -> Option<bool> {
        match self {
            PreferenceOverride::Inherit => None,
            PreferenceOverride::ForceOn => Some(true),
            PreferenceOverride::ForceOff => Some(false),
        }
    }

    /// Effective behavior: the override if present, else the global
    /// default. Resolution is owned by the server; this mirror exists for
    /// display only.
    pub fn resolve(self, default: bool) -> bool {
        self.to_wire().unwrap_or(default)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PreferenceAxis {
    Video,
    Note,
}

/// Complete preference tuple as submitted to the service. The server
/// never accepts a partial patch, so both axes are always present.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PreferencePair {
    pub video: Option<bool>,
    pub note: Option<bool>,
}

impl PreferencePair {
    /// Build the pair for changing one axis: the touched axis takes the
    /// new value, the other axis re-sends the account's current value
    /// unchanged.
    pub fn for_change(account: &Account, axis: PreferenceAxis, value: PreferenceOverride) -> Self {
        match axis {
            PreferenceAxis::Video => Self {
                video: value.to_wire(),
                note: account.download_note_override,
            },
            PreferenceAxis::Note => Self {
                video: account.download_video_override,
                note: value.to_wire(),
            },
        }
    }

    /// Apply a confirmed pair to the local record, both fields at once.
    pub fn apply_to(self, account: &mut Account) {
        account.download_video_override = self.video;
        account.download_note_override = self.note;
    }
}
