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
use strum::{AsRefStr, Display, EnumString};

use crate::Opcode;

/// The kind of message call or contract creation that opened a frame.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[allow(missing_docs)]
pub enum CallKind {
    CALL,
    CALLCODE,
    DELEGATECALL,
    STATICCALL,
    CREATE,
    CREATE2,
}

/// One interpreter step, as reported by the host's per-instruction
/// tracing facility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    /// The instruction about to execute.
    pub opcode: Opcode,
    /// Call-stack depth of the executing frame. The outermost frame runs
    /// at depth 1.
    pub depth: u64,
    /// Gas remaining before this instruction executes.
    pub gas: u64,
    /// Gas cost of this instruction.
    pub gas_cost: u64,
    /// Topmost words of the operand stack; index 0 is the top.
    ///
    /// Hosts truncate this to the handful of words the instruction can
    /// consume, so it is a prefix of the real stack, not all of it.
    pub stack: Vec<U256>,
    /// Snapshot of the executing frame's memory.
    pub memory: Bytes,
    /// The executing account, i.e. the owner of any storage this
    /// instruction touches.
    pub contract: Address,
}

/// A nested call frame opening.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEnterEvent {
    /// What kind of call opened the frame.
    pub kind: CallKind,
    /// Caller address.
    pub from: Address,
    /// Callee address.
    pub to: Address,
    /// Prefix of the call input.
    pub input: Bytes,
    /// Gas provided to the frame.
    pub gas: u64,
    /// Value transferred with the call.
    pub value: U256,
}

/// A nested call frame closing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameExitEvent {
    /// Gas consumed by the frame, children included.
    pub gas_used: u64,
    /// The frame's error, if it did not complete successfully.
    pub error: Option<String>,
    /// Prefix of the frame's return or revert data.
    pub output: Bytes,
}

/// One event in the linear execution trace of a simulated call.
///
/// Events are delivered strictly in execution order and consumed in a
/// single pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEvent {
    /// A per-instruction step.
    Step(StepEvent),
    /// A nested call frame opened.
    FrameEnter(FrameEnterEvent),
    /// The innermost open call frame closed.
    FrameExit(FrameExitEvent),
    /// The host aborted the traced call itself.
    Fault {
        /// The host's fault message.
        error: String,
    },
}

/// Host-provided read access to chain state at the traced block.
///
/// The engine never re-derives state from bytecode; slot values and code
/// sizes come from the same host that produced the trace.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait StateReader {
    /// Current value of a storage slot.
    fn storage(&self, address: Address, slot: U256) -> U256;

    /// Byte length of the code deployed at an address. Zero for empty
    /// and non-existent accounts.
    fn code_length(&self, address: Address) -> u64;
}
