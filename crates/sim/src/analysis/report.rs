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

use alloy_primitives::Bytes;
use serde::Serialize;

use super::{AnalysisMode, CallRecord, LogRecord, Phase, TopLevelAccess};

/// The immutable terminal snapshot of one trace analysis, produced
/// exactly once after the last event is consumed.
///
/// Which sections are populated depends on the [`AnalysisMode`] the
/// analyzer ran in; sections outside the mode's profile stay empty.
/// A host fault leaves whatever partial state was accumulated in place
/// and surfaces the raw message in [`Report::error`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// The mode the analyzer ran in.
    pub mode: AnalysisMode,
    /// The lifecycle phase the trace ended in.
    pub phase: Phase,
    /// Finished calls in close order, including synthesized top-level
    /// halts. Collector mode only.
    pub calls: Vec<CallRecord>,
    /// One access level per depth-1 `CALL`/`STATICCALL`, in entry order.
    /// Collector mode only.
    pub access_levels: Vec<TopLevelAccess>,
    /// Captured hash preimages. Collector mode only.
    pub keccak: Vec<Bytes>,
    /// Captured log records. Collector mode only.
    pub logs: Vec<LogRecord>,
    /// Bounded revert payloads from execution-phase frame exits, in
    /// observation order. Error and execution-gas modes.
    pub reverts: Vec<Bytes>,
    /// Whether any validation-phase instruction ran short of gas.
    pub validation_oog: bool,
    /// Whether any execution-phase instruction ran short of gas.
    pub execution_oog: bool,
    /// The minimum gas limit the execution phase must be given, per the
    /// 63/64 gas-forwarding rule. Execution-gas mode only.
    pub execution_gas_limit: u64,
    /// The correlated user-operation event, if one was emitted.
    pub user_operation_event: Option<LogRecord>,
    /// Raw output of the overall simulated call.
    pub output: Bytes,
    /// The overall call's error or the host's fault message, if any.
    pub error: Option<String>,
}
