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

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString, VariantNames};

/// An [EVM opcode](https://evm.codes), identified by its mnemonic.
///
/// Trace events carry opcodes under the mnemonic strings emitted by the
/// host's tracing facility, so the string forms accept the common aliases
/// (`KECCAK256` for `SHA3`, `PREVRANDAO`/`RANDOM` for `DIFFICULTY`).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    VariantNames,
    EnumIter,
    EnumCount,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    // 0x00 range - arithmetic.
    STOP = 0x00,
    ADD,
    MUL,
    SUB,
    DIV,
    SDIV,
    MOD,
    SMOD,
    ADDMOD,
    MULMOD,
    EXP,
    SIGNEXTEND,

    // 0x10 range - comparison and bitwise.
    LT = 0x10,
    GT,
    SLT,
    SGT,
    EQ,
    ISZERO,
    AND,
    OR,
    XOR,
    NOT,
    BYTE,
    SHL,
    SHR,
    SAR,

    // 0x20 - hashing.
    #[serde(alias = "KECCAK256")]
    #[strum(to_string = "SHA3", serialize = "KECCAK256")]
    SHA3 = 0x20,

    // 0x30 range - environment.
    ADDRESS = 0x30,
    BALANCE,
    ORIGIN,
    CALLER,
    CALLVALUE,
    CALLDATALOAD,
    CALLDATASIZE,
    CALLDATACOPY,
    CODESIZE,
    CODECOPY,
    GASPRICE,
    EXTCODESIZE,
    EXTCODECOPY,
    RETURNDATASIZE,
    RETURNDATACOPY,
    EXTCODEHASH,

    // 0x40 range - block context.
    BLOCKHASH = 0x40,
    COINBASE,
    TIMESTAMP,
    NUMBER,
    #[serde(alias = "PREVRANDAO", alias = "RANDOM")]
    #[strum(
        to_string = "DIFFICULTY",
        serialize = "PREVRANDAO",
        serialize = "RANDOM"
    )]
    DIFFICULTY,
    GASLIMIT,
    CHAINID,
    SELFBALANCE,
    BASEFEE,
    BLOBHASH,
    BLOBBASEFEE,

    // 0x50 range - stack, memory, storage, and flow.
    POP = 0x50,
    MLOAD,
    MSTORE,
    MSTORE8,
    SLOAD,
    SSTORE,
    JUMP,
    JUMPI,
    PC,
    MSIZE,
    GAS,
    JUMPDEST,
    TLOAD,
    TSTORE,
    MCOPY,

    // 0x5F-0x7F - pushes.
    PUSH0 = 0x5f,
    PUSH1,
    PUSH2,
    PUSH3,
    PUSH4,
    PUSH5,
    PUSH6,
    PUSH7,
    PUSH8,
    PUSH9,
    PUSH10,
    PUSH11,
    PUSH12,
    PUSH13,
    PUSH14,
    PUSH15,
    PUSH16,
    PUSH17,
    PUSH18,
    PUSH19,
    PUSH20,
    PUSH21,
    PUSH22,
    PUSH23,
    PUSH24,
    PUSH25,
    PUSH26,
    PUSH27,
    PUSH28,
    PUSH29,
    PUSH30,
    PUSH31,
    PUSH32,

    // 0x80 range - dups.
    DUP1 = 0x80,
    DUP2,
    DUP3,
    DUP4,
    DUP5,
    DUP6,
    DUP7,
    DUP8,
    DUP9,
    DUP10,
    DUP11,
    DUP12,
    DUP13,
    DUP14,
    DUP15,
    DUP16,

    // 0x90 range - swaps.
    SWAP1 = 0x90,
    SWAP2,
    SWAP3,
    SWAP4,
    SWAP5,
    SWAP6,
    SWAP7,
    SWAP8,
    SWAP9,
    SWAP10,
    SWAP11,
    SWAP12,
    SWAP13,
    SWAP14,
    SWAP15,
    SWAP16,

    // 0xA0 range - logging.
    LOG0 = 0xa0,
    LOG1,
    LOG2,
    LOG3,
    LOG4,

    // 0xF0 range - calls and halts.
    CREATE = 0xf0,
    CALL,
    CALLCODE,
    RETURN,
    DELEGATECALL,
    CREATE2,
    STATICCALL = 0xfa,
    REVERT = 0xfd,
    INVALID = 0xfe,
    SELFDESTRUCT = 0xff,
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::INVALID
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}

impl Opcode {
    /// True for the opcodes that open a message call: `CALL`, `CALLCODE`,
    /// `DELEGATECALL`, and `STATICCALL`.
    pub fn is_call_family(self) -> bool {
        matches!(
            self,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL
        )
    }

    /// True for the opcodes that probe another account's code:
    /// `EXTCODESIZE`, `EXTCODECOPY`, and `EXTCODEHASH`.
    pub fn is_ext_family(self) -> bool {
        matches!(
            self,
            Opcode::EXTCODESIZE | Opcode::EXTCODECOPY | Opcode::EXTCODEHASH
        )
    }

    /// True for `CREATE` and `CREATE2`.
    pub fn is_create_family(self) -> bool {
        matches!(self, Opcode::CREATE | Opcode::CREATE2)
    }

    /// Number of topics taken from the stack by a `LOG0`..`LOG4` opcode,
    /// or `None` for anything else.
    pub fn log_topic_count(self) -> Option<usize> {
        match self {
            Opcode::LOG0 => Some(0),
            Opcode::LOG1 => Some(1),
            Opcode::LOG2 => Some(2),
            Opcode::LOG3 => Some(3),
            Opcode::LOG4 => Some(4),
            _ => None,
        }
    }
}
