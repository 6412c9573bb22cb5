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

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Trace replay and admission-safety analysis for simulated user operations.
//!
//! The engine consumes the per-instruction execution trace of one simulated
//! call and produces a structured report:
//!
//! - Per-top-level-call opcode, storage, and code-access profiles for
//!   mempool rule enforcement
//! - Out-of-gas and revert findings per lifecycle phase
//! - A conservative minimum execution gas limit derived from the EVM's
//!   63/64 gas-forwarding rule
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export mocks and utilities for testing.

mod analysis;
pub use analysis::{
    analyze, AccessInfo, AnalysisMode, CallRecord, ContractSize, ExitKind, FinishedCall, LogRecord,
    Phase, Report, Settings, TopLevelAccess, TraceAnalyzer,
};

mod error;
pub use error::TraceError;
