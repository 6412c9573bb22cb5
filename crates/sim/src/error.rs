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

use traceguard_types::Opcode;

/// A structural defect in the event stream. Fatal to the current
/// analysis: the replay aborts rather than emit a partially-correct
/// report.
///
/// Out-of-gas conditions, reverts, and host faults are findings surfaced
/// in the report, never errors.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A frame exit arrived with no matching open frame. The only allowed
    /// unmatched exit is a depth-1 `RETURN`/`REVERT` step, which the
    /// tracker synthesizes itself.
    #[error("frame exit at depth {depth} has no matching open frame")]
    ExitWithoutFrame {
        /// Depth at which the exit was observed.
        depth: u64,
    },

    /// A step did not carry enough stack words for its opcode's operands.
    #[error("{opcode} at depth {depth} needs {wanted} stack words, step carried {have}")]
    StackUnderflow {
        /// The opcode whose operands were being read.
        opcode: Opcode,
        /// Depth of the offending step.
        depth: u64,
        /// Number of stack words the read required.
        wanted: usize,
        /// Number of stack words the step carried.
        have: usize,
    },

    /// A step reported a call depth outside the EVM's bounds.
    #[error("call depth {depth} outside bounds [1, {max}]")]
    CallDepthOutOfBounds {
        /// The reported depth.
        depth: u64,
        /// The configured depth cap.
        max: u64,
    },
}
