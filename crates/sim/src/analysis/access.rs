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

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use arrayvec::ArrayVec;
use serde::Serialize;
use traceguard_types::{Opcode, StateReader, StepEvent};

use super::{memory_slice, stack_peek, Settings};
use crate::TraceError;

/// Per-contract storage access counters within one top-level call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessInfo {
    /// Slot value as first observed, recorded only when neither a prior
    /// read nor a prior write of the slot occurred in the same level.
    pub reads: BTreeMap<U256, U256>,
    /// Number of writes per slot.
    pub writes: BTreeMap<U256, u64>,
}

/// Code length recorded the first time an address is probed within a
/// level, along with the opcode that probed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSize {
    /// Deployed code length in bytes.
    pub contract_size: u64,
    /// The probing opcode.
    pub opcode: Opcode,
}

/// A log record captured from a `LOG0`..`LOG4` opcode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Topics read from the stack.
    pub topics: Vec<B256>,
    /// Bounded slice of the log data.
    pub data: Bytes,
}

/// Everything recorded for one top-level call: a depth-1 `CALL` or
/// `STATICCALL` opens a level, and all deeper activity until the next one
/// is attributed to it. Counters are per-level, never merged across
/// levels. Maps are ordered so identical replays serialize identically.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLevelAccess {
    /// First four bytes of the call input.
    pub top_level_method_sig: Bytes,
    /// The callee of the top-level call.
    pub top_level_target_address: Address,
    /// Storage reads and writes keyed by the contract that owns the
    /// storage.
    pub access: BTreeMap<Address, AccessInfo>,
    /// Opcode usage histogram, cheap stack/arithmetic opcodes excluded.
    pub opcodes: BTreeMap<Opcode, u64>,
    /// Addresses probed by `EXTCODE*` opcodes outside the recognized
    /// emptiness-check pattern, keyed to the opcode that followed.
    pub ext_code_access_info: BTreeMap<Address, Opcode>,
    /// Code sizes of contracts touched by code probes and calls.
    pub contract_size: BTreeMap<Address, ContractSize>,
    /// Whether an instruction in this level ran short of gas.
    pub oog: bool,
}

impl TopLevelAccess {
    fn open(method_sig: Bytes, target: Address) -> Self {
        Self {
            top_level_method_sig: method_sig,
            top_level_target_address: target,
            access: BTreeMap::new(),
            opcodes: BTreeMap::new(),
            ext_code_access_info: BTreeMap::new(),
            contract_size: BTreeMap::new(),
            oog: false,
        }
    }
}

#[derive(Clone, Debug)]
struct WindowEntry {
    opcode: Opcode,
    stack_top: ArrayVec<U256, 3>,
}

/// Collector-mode bookkeeping: storage, opcode, code-probe, preimage,
/// and log recording, attributed to the current top-level access level.
#[derive(Debug, Default)]
pub(crate) struct AccessRecorder {
    levels: Vec<TopLevelAccess>,
    keccak: Vec<Bytes>,
    logs: Vec<LogRecord>,
    last_op: Option<Opcode>,
    window: ArrayVec<WindowEntry, 3>,
    stopped: bool,
}

impl AccessRecorder {
    /// Once the stop topic has been seen, the rest of the stream is
    /// consumed without bookkeeping so post-validation activity is not
    /// attributed to the wrong phase.
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn into_parts(self) -> (Vec<TopLevelAccess>, Vec<Bytes>, Vec<LogRecord>) {
        (self.levels, self.keccak, self.logs)
    }

    pub(crate) fn on_step<S: StateReader>(
        &mut self,
        step: &StepEvent,
        settings: &Settings,
        state: &S,
    ) -> Result<(), TraceError> {
        if self.stopped {
            return Ok(());
        }
        let opcode = step.opcode;

        self.push_window(step);

        if step.gas < step.gas_cost
            || (opcode == Opcode::SSTORE && step.gas < settings.sstore_stipend)
        {
            if let Some(level) = self.levels.last_mut() {
                level.oog = true;
            }
        }

        if matches!(opcode, Opcode::RETURN | Opcode::REVERT) {
            self.window.clear();
        }

        if step.depth == 1 {
            match opcode {
                Opcode::CALL | Opcode::STATICCALL => self.open_level(step)?,
                Opcode::LOG1 => {
                    let topic = B256::from(stack_peek(step, 2)?);
                    if topic == settings.stop_collecting_topic {
                        tracing::debug!("stop-collecting topic observed, halting bookkeeping");
                        self.stopped = true;
                    }
                }
                _ => {}
            }
            self.last_op = None;
            return Ok(());
        }

        let Some(level) = self.levels.last_mut() else {
            // Nothing deeper than depth 1 can be attributed before the
            // first top-level call opens a level.
            return Ok(());
        };

        // An EXTCODE* opcode two positions back probed an address; the
        // only benign shape is the emptiness check `EXTCODESIZE, ISZERO`.
        if self.window.len() >= 2 {
            let prev = &self.window[self.window.len() - 2];
            if prev.opcode.is_ext_family() {
                if let Some(&probed) = prev.stack_top.first() {
                    let safe_check = self.window.len() == 3
                        && self.window[1].opcode == Opcode::EXTCODESIZE
                        && self.window[2].opcode == Opcode::ISZERO;
                    if !safe_check {
                        level
                            .ext_code_access_info
                            .insert(word_to_address(probed), opcode);
                    }
                }
            }
        }

        if opcode.is_ext_family() || opcode.is_call_family() {
            let operand = if opcode.is_ext_family() { 0 } else { 1 };
            let address = word_to_address(stack_peek(step, operand)?);
            if !level.contract_size.contains_key(&address) && !is_reserved_precompile(address) {
                level.contract_size.insert(
                    address,
                    ContractSize {
                        contract_size: state.code_length(address),
                        opcode,
                    },
                );
            }
        }

        // A bare GAS read is suspicious introspection; one immediately
        // consumed by a call is how gas forwarding is written.
        if self.last_op == Some(Opcode::GAS) && !opcode.is_call_family() {
            *level.opcodes.entry(Opcode::GAS).or_default() += 1;
        }
        if opcode != Opcode::GAS && !settings.cheap_opcodes.contains(&opcode) {
            *level.opcodes.entry(opcode).or_default() += 1;
        }
        self.last_op = Some(opcode);

        match opcode {
            Opcode::SLOAD | Opcode::SSTORE => {
                let slot = stack_peek(step, 0)?;
                let owner = step.contract;
                let access = level.access.entry(owner).or_default();
                if opcode == Opcode::SLOAD {
                    // First read wins, and only if the slot was not
                    // already written in this level.
                    if !access.reads.contains_key(&slot) && !access.writes.contains_key(&slot) {
                        access.reads.insert(slot, state.storage(owner, slot));
                    }
                } else {
                    *access.writes.entry(slot).or_default() += 1;
                }
            }
            Opcode::SHA3 => {
                let offset = stack_peek(step, 0)?;
                let len = stack_peek(step, 1)?;
                if len > U256::from(settings.preimage_min_len)
                    && len < U256::from(settings.preimage_max_len)
                {
                    self.keccak.push(memory_slice(
                        &step.memory,
                        offset,
                        len,
                        settings.preimage_max_len,
                    ));
                }
            }
            _ => {
                if let Some(topic_count) = opcode.log_topic_count() {
                    let offset = stack_peek(step, 0)?;
                    let len = stack_peek(step, 1)?;
                    let mut topics = Vec::with_capacity(topic_count);
                    for i in 0..topic_count {
                        topics.push(B256::from(stack_peek(step, 2 + i)?));
                    }
                    self.logs.push(LogRecord {
                        topics,
                        data: memory_slice(&step.memory, offset, len, settings.max_capture_len),
                    });
                }
            }
        }

        Ok(())
    }

    fn push_window(&mut self, step: &StepEvent) {
        if self.window.is_full() {
            self.window.remove(0);
        }
        let mut stack_top = ArrayVec::new();
        for word in step.stack.iter().take(3) {
            stack_top.push(*word);
        }
        self.window.push(WindowEntry {
            opcode: step.opcode,
            stack_top,
        });
    }

    /// A depth-1 `CALL`/`STATICCALL` opens a fresh level. The callee
    /// address and the calldata offset come from the call's stack
    /// operands; the 4-byte selector is read out of memory.
    fn open_level(&mut self, step: &StepEvent) -> Result<(), TraceError> {
        let target = word_to_address(stack_peek(step, 1)?);
        let args_offset_operand = match step.opcode {
            // CALL: gas, address, value, argsOffset, ...
            Opcode::CALL => 3,
            // STATICCALL: gas, address, argsOffset, ...
            _ => 2,
        };
        let args_offset = stack_peek(step, args_offset_operand)?;
        let method_sig = memory_slice(&step.memory, args_offset, U256::from(4), 4);
        self.levels.push(TopLevelAccess::open(method_sig, target));
        Ok(())
    }
}

fn word_to_address(word: U256) -> Address {
    Address::from_word(B256::from(word))
}

/// The reserved stateless precompiles at addresses 1 through 9 are
/// exempt from code-size probing.
fn is_reserved_precompile(address: Address) -> bool {
    let value = U256::from_be_slice(address.as_slice());
    value >= U256::from(1) && value <= U256::from(9)
}

#[cfg(test)]
mod tests {
    use traceguard_types::MockStateReader;

    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    fn state() -> MockStateReader {
        let mut state = MockStateReader::new();
        state
            .expect_storage()
            .returning(|_, slot| slot.saturating_add(U256::from(100)));
        state.expect_code_length().returning(|_| 321);
        state
    }

    fn step(opcode: Opcode, depth: u64, stack: &[u64]) -> StepEvent {
        StepEvent {
            opcode,
            depth,
            gas: 1_000_000,
            gas_cost: 3,
            stack: stack.iter().map(|&word| U256::from(word)).collect(),
            memory: Bytes::new(),
            contract: Address::repeat_byte(0xcc),
        }
    }

    fn open_call_level(recorder: &mut AccessRecorder, target: u64) {
        let mut call = step(Opcode::CALL, 1, &[5_000, target, 0, 0, 4]);
        call.memory = Bytes::from_static(&[0xab, 0xcd, 0xef, 0x01]);
        recorder.on_step(&call, &settings(), &state()).unwrap();
    }

    #[test]
    fn depth_one_call_opens_level_with_selector() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 0x99);

        let (levels, _, _) = recorder.into_parts();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].top_level_method_sig[..], [0xab, 0xcd, 0xef, 0x01]);
        assert_eq!(
            levels[0].top_level_target_address,
            word_to_address(U256::from(0x99))
        );
    }

    #[test]
    fn staticcall_reads_args_offset_from_third_operand() {
        let mut recorder = AccessRecorder::default();
        let mut call = step(Opcode::STATICCALL, 1, &[5_000, 0x42, 1, 4]);
        call.memory = Bytes::from_static(&[0x00, 0x11, 0x22, 0x33, 0x44]);
        recorder.on_step(&call, &settings(), &state()).unwrap();

        let (levels, _, _) = recorder.into_parts();
        assert_eq!(levels[0].top_level_method_sig[..], [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn first_write_dominates_later_reads() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(&step(Opcode::SSTORE, 2, &[7, 1]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(&step(Opcode::SLOAD, 2, &[7]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        let access = &levels[0].access[&Address::repeat_byte(0xcc)];
        assert!(access.reads.is_empty());
        assert_eq!(access.writes[&U256::from(7)], 1);
    }

    #[test]
    fn first_read_records_value_once() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(&step(Opcode::SLOAD, 2, &[7]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(&step(Opcode::SLOAD, 2, &[7]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(&step(Opcode::SSTORE, 2, &[7, 9]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        let access = &levels[0].access[&Address::repeat_byte(0xcc)];
        assert_eq!(access.reads[&U256::from(7)], U256::from(107));
        assert_eq!(access.writes[&U256::from(7)], 1);
    }

    #[test]
    fn histogram_skips_cheap_opcodes_and_bare_gas_rule() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(&step(Opcode::PUSH1, 2, &[]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(&step(Opcode::TIMESTAMP, 2, &[]), &settings(), &state())
            .unwrap();
        // GAS immediately consumed by a call: not counted.
        recorder
            .on_step(&step(Opcode::GAS, 2, &[]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(
                &step(Opcode::CALL, 2, &[1, 0x500, 0, 0, 0]),
                &settings(),
                &state(),
            )
            .unwrap();
        // Bare GAS followed by arithmetic: counted.
        recorder
            .on_step(&step(Opcode::GAS, 2, &[]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(&step(Opcode::ADD, 2, &[]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        let opcodes = &levels[0].opcodes;
        assert!(!opcodes.contains_key(&Opcode::PUSH1));
        assert!(!opcodes.contains_key(&Opcode::ADD));
        assert_eq!(opcodes[&Opcode::TIMESTAMP], 1);
        assert_eq!(opcodes[&Opcode::GAS], 1);
        assert_eq!(opcodes[&Opcode::CALL], 1);
    }

    #[test]
    fn extcodesize_iszero_is_a_safe_emptiness_check() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(&step(Opcode::DUP1, 2, &[0x777]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(
                &step(Opcode::EXTCODESIZE, 2, &[0x777]),
                &settings(),
                &state(),
            )
            .unwrap();
        recorder
            .on_step(&step(Opcode::ISZERO, 2, &[0]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        assert!(levels[0].ext_code_access_info.is_empty());
    }

    #[test]
    fn extcodesize_without_iszero_is_flagged() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(&step(Opcode::DUP1, 2, &[0x777]), &settings(), &state())
            .unwrap();
        recorder
            .on_step(
                &step(Opcode::EXTCODESIZE, 2, &[0x777]),
                &settings(),
                &state(),
            )
            .unwrap();
        recorder
            .on_step(&step(Opcode::POP, 2, &[0]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        assert_eq!(
            levels[0].ext_code_access_info[&word_to_address(U256::from(0x777))],
            Opcode::POP
        );
    }

    #[test]
    fn code_probe_records_size_once_and_skips_precompiles() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        recorder
            .on_step(
                &step(Opcode::EXTCODEHASH, 2, &[0x888]),
                &settings(),
                &state(),
            )
            .unwrap();
        recorder
            .on_step(
                &step(Opcode::STATICCALL, 2, &[500, 0x888, 0, 0]),
                &settings(),
                &state(),
            )
            .unwrap();
        // ecrecover at address 1 is reserved.
        recorder
            .on_step(
                &step(Opcode::STATICCALL, 2, &[500, 0x1, 0, 0]),
                &settings(),
                &state(),
            )
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        let target = word_to_address(U256::from(0x888));
        assert_eq!(levels[0].contract_size.len(), 1);
        assert_eq!(levels[0].contract_size[&target].contract_size, 321);
        assert_eq!(levels[0].contract_size[&target].opcode, Opcode::EXTCODEHASH);
    }

    #[test]
    fn preimage_window_is_exclusive_on_both_ends() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        let mut hash = step(Opcode::SHA3, 2, &[0, 64]);
        hash.memory = vec![0x5a; 600].into();
        recorder.on_step(&hash, &settings(), &state()).unwrap();

        let mut too_short = step(Opcode::SHA3, 2, &[0, 19]);
        too_short.memory = vec![0x5a; 600].into();
        recorder.on_step(&too_short, &settings(), &state()).unwrap();

        let mut too_long = step(Opcode::SHA3, 2, &[0, 513]);
        too_long.memory = vec![0x5a; 600].into();
        recorder.on_step(&too_long, &settings(), &state()).unwrap();

        let (_, keccak, _) = recorder.into_parts();
        assert_eq!(keccak.len(), 1);
        assert_eq!(keccak[0].len(), 64);
    }

    #[test]
    fn log_capture_reads_topics_from_stack() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        let mut log = step(Opcode::LOG2, 2, &[0, 3, 0xaaaa, 0xbbbb]);
        log.memory = Bytes::from_static(&[1, 2, 3, 4]);
        recorder.on_step(&log, &settings(), &state()).unwrap();

        let (_, _, logs) = recorder.into_parts();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].topics.len(), 2);
        assert_eq!(logs[0].topics[0], B256::from(U256::from(0xaaaa)));
        assert_eq!(logs[0].data[..], [1, 2, 3]);
    }

    #[test]
    fn stop_topic_halts_bookkeeping() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        let stop_word = U256::from_be_bytes(settings().stop_collecting_topic.0);
        let mut stop = step(Opcode::LOG1, 1, &[]);
        stop.stack = vec![U256::ZERO, U256::ZERO, stop_word];
        recorder.on_step(&stop, &settings(), &state()).unwrap();
        assert!(recorder.is_stopped());

        recorder
            .on_step(&step(Opcode::SSTORE, 2, &[7, 1]), &settings(), &state())
            .unwrap();
        let (levels, _, _) = recorder.into_parts();
        assert!(levels[0].access.is_empty());
    }

    #[test]
    fn sstore_below_stipend_marks_oog() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);

        let mut store = step(Opcode::SSTORE, 2, &[7, 1]);
        store.gas = 2_299;
        store.gas_cost = 100;
        recorder.on_step(&store, &settings(), &state()).unwrap();

        let (levels, _, _) = recorder.into_parts();
        assert!(levels[0].oog);
    }

    #[test]
    fn counters_never_merge_across_levels() {
        let mut recorder = AccessRecorder::default();
        open_call_level(&mut recorder, 1_000);
        recorder
            .on_step(&step(Opcode::SLOAD, 2, &[7]), &settings(), &state())
            .unwrap();

        open_call_level(&mut recorder, 2_000);
        recorder
            .on_step(&step(Opcode::SLOAD, 2, &[7]), &settings(), &state())
            .unwrap();

        let (levels, _, _) = recorder.into_parts();
        assert_eq!(levels.len(), 2);
        for level in &levels {
            let access = &level.access[&Address::repeat_byte(0xcc)];
            assert_eq!(access.reads.len(), 1);
        }
    }
}
