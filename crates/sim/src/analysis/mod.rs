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

use std::collections::HashSet;

use alloy_primitives::{b256, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use strum::Display;
use traceguard_types::{Opcode, StepEvent};

use crate::TraceError;

mod access;
pub use access::{AccessInfo, ContractSize, LogRecord, TopLevelAccess};

mod analyzer;
pub use analyzer::{analyze, TraceAnalyzer};

mod frames;
pub use frames::{CallRecord, ExitKind, FinishedCall};

mod gas;

mod phase;
pub use phase::Phase;

mod report;
pub use report::Report;

/// Which profile of the trace the analyzer produces.
///
/// One engine serves all three; the mode selects which sub-components are
/// driven while the stream is replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisMode {
    /// Full per-top-level-call opcode, storage, and code-access profile,
    /// for mempool reputation and banned-opcode rule enforcement.
    #[default]
    Collector,
    /// Revert and out-of-gas findings only, for quick admission rejection.
    Error,
    /// The `Error` profile plus the minimum execution gas limit, for
    /// bundling and fee-estimation gates.
    ExecutionGas,
}

/// Protocol-convention constants used while replaying a trace.
///
/// These track a specific network-upgrade baseline and the entry point
/// contract's event signatures, so they are configuration rather than
/// hardcoded literals.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The marker instruction whose occurrence at depth 1 advances the
    /// lifecycle phase.
    pub marker_opcode: Opcode,
    /// `SSTORE` is treated as out of gas below this amount of available
    /// gas, modeling the EVM's call-stipend floor.
    pub sstore_stipend: u64,
    /// Hash preimages are captured only when strictly longer than this.
    pub preimage_min_len: usize,
    /// Hash preimages are captured only when strictly shorter than this.
    pub preimage_max_len: usize,
    /// Truncation cap for captured output, revert, and log data slices.
    pub max_capture_len: usize,
    /// Defensive bound on reported call depth. The EVM caps nesting at
    /// 1024.
    pub max_call_depth: u64,
    /// Stack-manipulation and basic arithmetic opcodes excluded from the
    /// per-level histogram.
    pub cheap_opcodes: HashSet<Opcode>,
    /// `LOG1` topic at depth 1 that marks the end of all validation-phase
    /// work; collector bookkeeping stops once it is seen.
    ///
    /// Defaults to `keccak("BeforeExecution()")`.
    pub stop_collecting_topic: B256,
    /// Topic 0 of the entry point's user-operation event, correlated into
    /// the report when seen at depth <= 2.
    pub user_op_event_topic: B256,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            marker_opcode: Opcode::NUMBER,
            sstore_stipend: 2_300,
            preimage_min_len: 20,
            preimage_max_len: 512,
            max_capture_len: 2_000,
            max_call_depth: 1_024,
            cheap_opcodes: default_cheap_opcodes(),
            stop_collecting_topic: b256!(
                "bb47ee3e183a558b1a2ff0874b079f3fc5478b7454eacf2bfc5af2ff5878f972"
            ),
            user_op_event_topic: b256!(
                "49628fd1471006c1482da88028e9ce4dbb080b815c9b0344d39e5a8e6ec1419f"
            ),
        }
    }
}

/// The default histogram exclusion set: pushes, dups, swaps, `POP`, and
/// basic arithmetic, comparison, and bitwise opcodes.
fn default_cheap_opcodes() -> HashSet<Opcode> {
    use Opcode::*;

    let named = [
        POP, ADD, SUB, MUL, DIV, EQ, LT, GT, SLT, SGT, SHL, SHR, AND, OR, NOT, ISZERO,
    ];
    named
        .into_iter()
        .chain(opcode_byte_range(0x5f, 0x9f)) // PUSH0..=PUSH32, DUP*, SWAP*
        .collect()
}

fn opcode_byte_range(start: u8, end: u8) -> impl Iterator<Item = Opcode> {
    (start..=end).filter_map(|byte| Opcode::try_from(byte).ok())
}

/// Reads the `index`th stack word of a step, failing structurally when
/// the host delivered too few words for the opcode's operands.
pub(crate) fn stack_peek(step: &StepEvent, index: usize) -> Result<U256, TraceError> {
    step.stack
        .get(index)
        .copied()
        .ok_or(TraceError::StackUnderflow {
            opcode: step.opcode,
            depth: step.depth,
            wanted: index + 1,
            have: step.stack.len(),
        })
}

/// Copies `memory[offset..offset + len]`, clamped to the snapshot bounds
/// and truncated to `cap` bytes.
pub(crate) fn memory_slice(memory: &[u8], offset: U256, len: U256, cap: usize) -> Bytes {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let len = usize::try_from(len).unwrap_or(usize::MAX).min(cap);
    if len == 0 || offset >= memory.len() {
        return Bytes::new();
    }
    let end = offset.saturating_add(len).min(memory.len());
    Bytes::copy_from_slice(&memory[offset..end])
}

/// Truncates a captured byte slice to `cap` bytes.
pub(crate) fn bounded_prefix(bytes: &[u8], cap: usize) -> Bytes {
    Bytes::copy_from_slice(&bytes[..bytes.len().min(cap)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheap_set_covers_stack_manipulation() {
        let cheap = default_cheap_opcodes();
        assert!(cheap.contains(&Opcode::PUSH0));
        assert!(cheap.contains(&Opcode::PUSH32));
        assert!(cheap.contains(&Opcode::DUP16));
        assert!(cheap.contains(&Opcode::SWAP1));
        assert!(cheap.contains(&Opcode::ISZERO));
        assert!(!cheap.contains(&Opcode::GAS));
        assert!(!cheap.contains(&Opcode::SLOAD));
        assert!(!cheap.contains(&Opcode::XOR));
    }

    #[test]
    fn memory_slice_clamps_to_snapshot() {
        let memory = [1u8, 2, 3, 4];
        assert_eq!(
            memory_slice(&memory, U256::from(1), U256::from(2), 100)[..],
            [2, 3]
        );
        assert_eq!(
            memory_slice(&memory, U256::from(2), U256::from(100), 100)[..],
            [3, 4]
        );
        assert!(memory_slice(&memory, U256::from(9), U256::from(1), 100).is_empty());
        assert_eq!(
            memory_slice(&memory, U256::from(0), U256::from(4), 2)[..],
            [1, 2]
        );
        assert!(memory_slice(&memory, U256::MAX, U256::from(1), 100).is_empty());
    }
}
