// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sector lifecycle state machine

use crate::errors::InvalidTransition;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SectorState {
    Requested,
    Planning,
    Provisioning,
    Active,
    Degraded,
    TearingDown,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum SectorEvent {
    /// The manifest passed validation.
    Accepted,
    /// Tags and addresses were committed.
    Planned,
    /// Every action of the chain was applied.
    Applied,
    /// An action of the chain failed.
    ApplyFailed,
    /// The desired state no longer matches the platform.
    DesiredChanged,
    /// Operator or periodic re-trigger of a degraded Sector.
    Retry,
    DeleteRequested,
    /// Every Sector object is gone from the platform and the allocations were released.
    TornDown,
}

impl SectorState {
    /// Compute the state reached from `self` on `event`.
    pub fn on(self, event: SectorEvent) -> Result<SectorState, InvalidTransition> {
        use SectorEvent as E;
        use SectorState as S;
        if self == S::Deleted {
            return Err(InvalidTransition { from: self, event });
        }
        let next = match (self, event) {
            (S::Requested, E::Accepted) => S::Planning,
            (S::Planning, E::Planned) => S::Provisioning,
            (S::Provisioning, E::Applied) => S::Active,
            (S::Provisioning, E::ApplyFailed) => S::Degraded,
            // a failed teardown is still a teardown; only another delete moves it on
            (S::TearingDown, E::ApplyFailed) => S::TearingDown,
            (S::Active | S::Degraded, E::DesiredChanged) | (S::Degraded, E::Retry) => {
                S::Provisioning
            }
            (_, E::DeleteRequested) => S::TearingDown,
            (S::TearingDown, E::TornDown) => S::Deleted,
            _ => return Err(InvalidTransition { from: self, event }),
        };
        Ok(next)
    }

    /// Whether the Sector is holding platform objects that reconciliation manages.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, SectorState::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use SectorEvent as E;
    use SectorState as S;

    #[test]
    fn happy_path() {
        let mut state = S::Requested;
        for event in [E::Accepted, E::Planned, E::Applied] {
            state = state.on(event).unwrap();
        }
        assert_eq!(state, S::Active);
        state = state.on(E::DesiredChanged).unwrap();
        assert_eq!(state, S::Provisioning);
        state = state.on(E::ApplyFailed).unwrap();
        assert_eq!(state, S::Degraded);
        state = state.on(E::Retry).unwrap();
        assert_eq!(state, S::Provisioning);
    }

    #[test]
    fn delete_from_anywhere_but_deleted() {
        for state in S::iter() {
            let next = state.on(E::DeleteRequested);
            if state == S::Deleted {
                assert_eq!(
                    next,
                    Err(InvalidTransition {
                        from: S::Deleted,
                        event: E::DeleteRequested
                    })
                );
            } else {
                assert_eq!(next, Ok(S::TearingDown));
            }
        }
        assert_eq!(S::TearingDown.on(E::TornDown), Ok(S::Deleted));
    }

    #[test]
    fn failed_teardown_keeps_delete_intent() {
        let state = S::TearingDown.on(E::ApplyFailed).unwrap();
        assert_eq!(state, S::TearingDown);
        assert!(state.on(E::Retry).is_err());
        assert!(state.on(E::DesiredChanged).is_err());
        assert_eq!(state.on(E::DeleteRequested), Ok(S::TearingDown));
        assert_eq!(state.on(E::TornDown), Ok(S::Deleted));
    }

    #[test]
    fn deleted_is_terminal() {
        for event in E::iter() {
            assert!(S::Deleted.on(event).is_err());
        }
    }

    #[test]
    fn rejected_shortcuts() {
        assert!(S::Requested.on(E::Applied).is_err());
        assert!(S::Active.on(E::TornDown).is_err());
        assert!(S::Planning.on(E::Applied).is_err());
    }

    #[test]
    fn state_names() {
        assert_eq!(S::TearingDown.to_string(), "tearing-down");
        assert_eq!("degraded".parse::<S>().unwrap(), S::Degraded);
    }
}
