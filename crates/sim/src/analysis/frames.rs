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

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use strum::Display;
use traceguard_types::{CallKind, FrameEnterEvent, FrameExitEvent, Opcode};

use super::bounded_prefix;
use crate::TraceError;

/// A nested call observed in the trace, closed and fully attributed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedCall {
    /// Call-stack depth the frame ran at.
    pub depth: u64,
    /// The opcode family that opened the frame.
    pub kind: CallKind,
    /// Caller address.
    pub from: Address,
    /// Callee address.
    pub to: Address,
    /// First four bytes of the call input.
    pub method: Bytes,
    /// Gas provided to the frame.
    pub gas: u64,
    /// Value transferred with the call.
    pub value: U256,
    /// Gas consumed by the frame, children included.
    pub gas_used: u64,
    /// The frame's error, if any.
    pub error: Option<String>,
    /// Bounded prefix of the frame's output.
    pub output: Bytes,
}

/// How a synthesized top-level frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ExitKind {
    /// Halted with `RETURN`.
    Return,
    /// Halted with `REVERT`.
    Revert,
}

/// One entry in the finished-call list, in close order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallRecord {
    /// A call with explicit enter/exit framing.
    Call(FinishedCall),
    /// A depth-1 `RETURN`/`REVERT` reconstructed from opcode evidence.
    ///
    /// Hosts differ in whether the outermost call boundary generates
    /// frame events; when it does not, the tracker synthesizes a
    /// zero-duration record so the list stays complete either way.
    TopLevelExit {
        /// Which halt opcode was observed.
        exit: ExitKind,
        /// Always zero: the synthesized frame has no measured duration.
        gas_used: u64,
        /// Bounded memory slice at the halt opcode's offset/length
        /// operands.
        data: Bytes,
    },
}

#[derive(Clone, Debug)]
struct OpenFrame {
    depth: u64,
    kind: CallKind,
    from: Address,
    to: Address,
    method: Bytes,
    gas: u64,
    value: U256,
}

/// Reconstructs the nested call tree from frame enter/exit events.
///
/// Open frames are exclusively owned by the stack until closed, then
/// moved into the finished list.
#[derive(Debug, Default)]
pub(crate) struct CallTracker {
    open: Vec<OpenFrame>,
    finished: Vec<CallRecord>,
}

impl CallTracker {
    /// Opens a frame one level below the current innermost one. Frame
    /// events only ever describe nested calls, so the first open frame
    /// sits at depth 2, below the depth-1 top-level code.
    pub(crate) fn on_enter(&mut self, event: &FrameEnterEvent) {
        let depth = self.open.len() as u64 + 2;
        self.open.push(OpenFrame {
            depth,
            kind: event.kind,
            from: event.from,
            to: event.to,
            method: bounded_prefix(&event.input, 4),
            gas: event.gas,
            value: event.value,
        });
    }

    /// Closes the innermost open frame and appends it to the finished
    /// list. An exit with nothing open is structural corruption: the only
    /// legitimate unmatched exits are depth-1 halts, which arrive as
    /// steps and go through [`Self::on_top_level_halt`] instead.
    /// `current_depth` is where the stream placed the exit and is only
    /// used in the diagnostic.
    pub(crate) fn on_exit(
        &mut self,
        event: &FrameExitEvent,
        max_capture_len: usize,
        current_depth: u64,
    ) -> Result<(), TraceError> {
        let frame = self.open.pop().ok_or(TraceError::ExitWithoutFrame {
            depth: current_depth,
        })?;
        self.finished.push(CallRecord::Call(FinishedCall {
            depth: frame.depth,
            kind: frame.kind,
            from: frame.from,
            to: frame.to,
            method: frame.method,
            gas: frame.gas,
            value: frame.value,
            gas_used: event.gas_used,
            error: event.error.clone(),
            output: bounded_prefix(&event.output, max_capture_len),
        }));
        Ok(())
    }

    /// Whether a depth-1 halt step has no explicit frame to match, i.e.
    /// the synthesis rule applies.
    pub(crate) fn wants_top_level_halt(&self) -> bool {
        self.open.is_empty()
    }

    /// Appends a synthesized zero-duration record for a depth-1
    /// `RETURN`/`REVERT` step, leaving the open stack untouched.
    pub(crate) fn on_top_level_halt(&mut self, opcode: Opcode, data: Bytes) {
        let exit = match opcode {
            Opcode::REVERT => ExitKind::Revert,
            _ => ExitKind::Return,
        };
        self.finished.push(CallRecord::TopLevelExit {
            exit,
            gas_used: 0,
            data,
        });
    }

    pub(crate) fn into_finished(self) -> Vec<CallRecord> {
        self.finished
    }
}
