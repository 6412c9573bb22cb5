// This file is part of Traceguard.
//
// Traceguard is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Traceguard is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Traceguard.
// If not, see https://www.gnu.org/licenses/.

use serde::{Deserialize, Serialize};
use strum::Display;
use traceguard_types::Opcode;

/// Lifecycle phase of the simulated call.
///
/// The calling contract emits a marker instruction at depth 1 once per
/// phase boundary, giving the trace an in-band, protocol-agnostic signal
/// for which part of the lifecycle is executing.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Account (and factory) validation; the phase every trace starts in.
    #[default]
    Validation,
    /// Paymaster validation.
    PaymasterValidation,
    /// The user operation's execution call.
    Execution,
    /// Anything after execution: post-op work, or trailing activity the
    /// lifecycle does not name.
    PostOpOrUnknown,
}

impl Phase {
    /// Whether out-of-gas in this phase counts against validation.
    pub fn is_validation(self) -> bool {
        matches!(self, Phase::Validation | Phase::PaymasterValidation)
    }

    /// Whether this is exactly the execution phase.
    pub fn is_execution(self) -> bool {
        self == Phase::Execution
    }

    fn next(self) -> Self {
        match self {
            Phase::Validation => Phase::PaymasterValidation,
            Phase::PaymasterValidation => Phase::Execution,
            Phase::Execution | Phase::PostOpOrUnknown => Phase::PostOpOrUnknown,
        }
    }
}

/// Advances the phase on marker sightings. Monotonic: the phase never
/// regresses, and saturates at [`Phase::PostOpOrUnknown`].
#[derive(Clone, Debug, Default)]
pub(crate) struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    pub(crate) fn current(&self) -> Phase {
        self.current
    }

    /// Only a step at depth 1 whose opcode is the configured marker
    /// advances the phase; every other step is ignored here.
    pub(crate) fn on_step(&mut self, marker: Opcode, opcode: Opcode, depth: u64) {
        if depth == 1 && opcode == marker {
            let next = self.current.next();
            if next != self.current {
                tracing::debug!("phase {} -> {}", self.current, next);
                self.current = next;
            }
        }
    }
}
