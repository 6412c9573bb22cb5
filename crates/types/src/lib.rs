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

//! Traceguard common types
//!
//! The EVM opcode table, the per-instruction trace event model consumed by
//! the analysis engine, and the host-provided state access trait.

mod opcode;
pub use opcode::Opcode;

mod trace;
#[cfg(feature = "test-utils")]
pub use trace::MockStateReader;
pub use trace::{CallKind, FrameEnterEvent, FrameExitEvent, StateReader, StepEvent, TraceEvent};
