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

use alloy_primitives::{Bytes, B256};
use traceguard_types::{Opcode, StateReader, StepEvent, TraceEvent};

use super::{
    access::AccessRecorder, bounded_prefix, frames::CallTracker, gas::GasAccountant, memory_slice,
    phase::PhaseTracker, stack_peek, AnalysisMode, LogRecord, Report, Settings,
};
use crate::TraceError;

/// Replays the trace of one simulated call and accumulates the state
/// behind a [`Report`].
///
/// One analyzer is constructed fresh per trace, owns all accumulators,
/// and is consumed by [`TraceAnalyzer::finish`]. Replay is synchronous
/// and single-pass; a structural error aborts the whole analysis.
#[derive(Debug)]
pub struct TraceAnalyzer<'a, S> {
    mode: AnalysisMode,
    settings: Settings,
    state: &'a S,
    phases: PhaseTracker,
    frames: CallTracker,
    access: AccessRecorder,
    gas: GasAccountant,
    // Depth of the most recent step; frame events carry no depth of
    // their own.
    current_depth: u64,
    reverts: Vec<Bytes>,
    validation_oog: bool,
    execution_oog: bool,
    user_operation_event: Option<LogRecord>,
    fault: Option<String>,
}

impl<'a, S: StateReader> TraceAnalyzer<'a, S> {
    /// Creates an analyzer for one trace.
    pub fn new(mode: AnalysisMode, settings: Settings, state: &'a S) -> Self {
        Self {
            mode,
            settings,
            state,
            phases: PhaseTracker::default(),
            frames: CallTracker::default(),
            access: AccessRecorder::default(),
            gas: GasAccountant::default(),
            current_depth: 0,
            reverts: Vec::new(),
            validation_oog: false,
            execution_oog: false,
            user_operation_event: None,
            fault: None,
        }
    }

    /// Consumes the next event of the stream, in execution order.
    pub fn on_event(&mut self, event: &TraceEvent) -> Result<(), TraceError> {
        match event {
            TraceEvent::Step(step) => self.on_step(step),
            TraceEvent::FrameEnter(enter) => {
                match self.mode {
                    AnalysisMode::Collector => {
                        if !self.access.is_stopped() {
                            self.frames.on_enter(enter);
                        }
                    }
                    AnalysisMode::ExecutionGas => {
                        if self.phases.current().is_execution() {
                            self.gas.on_enter(self.current_depth);
                        }
                    }
                    AnalysisMode::Error => {}
                }
                Ok(())
            }
            TraceEvent::FrameExit(exit) => {
                match self.mode {
                    AnalysisMode::Collector => {
                        if !self.access.is_stopped() {
                            self.frames.on_exit(
                                exit,
                                self.settings.max_capture_len,
                                self.current_depth,
                            )?;
                        }
                    }
                    AnalysisMode::Error | AnalysisMode::ExecutionGas => {
                        if self.phases.current().is_execution() {
                            if exit.error.is_some() {
                                self.reverts.push(bounded_prefix(
                                    &exit.output,
                                    self.settings.max_capture_len,
                                ));
                            }
                            if self.mode == AnalysisMode::ExecutionGas {
                                self.gas.on_exit(self.current_depth, exit.gas_used);
                            }
                        }
                    }
                }
                Ok(())
            }
            TraceEvent::Fault { error } => {
                tracing::debug!(%error, "host fault while tracing");
                self.fault = Some(error.clone());
                Ok(())
            }
        }
    }

    /// Produces the report. `output` and `error` describe the overall
    /// simulated call as reported by the host at end of trace.
    pub fn finish(self, output: Bytes, error: Option<String>) -> Report {
        let (access_levels, keccak, logs) = self.access.into_parts();
        Report {
            mode: self.mode,
            phase: self.phases.current(),
            calls: self.frames.into_finished(),
            access_levels,
            keccak,
            logs,
            reverts: self.reverts,
            validation_oog: self.validation_oog,
            execution_oog: self.execution_oog,
            execution_gas_limit: self.gas.execution_gas_limit(),
            user_operation_event: self.user_operation_event,
            output,
            error: error.or(self.fault),
        }
    }

    fn on_step(&mut self, step: &StepEvent) -> Result<(), TraceError> {
        if step.depth < 1 || step.depth > self.settings.max_call_depth {
            return Err(TraceError::CallDepthOutOfBounds {
                depth: step.depth,
                max: self.settings.max_call_depth,
            });
        }
        self.current_depth = step.depth;
        self.phases
            .on_step(self.settings.marker_opcode, step.opcode, step.depth);

        match self.mode {
            AnalysisMode::Collector => self.on_collector_step(step),
            AnalysisMode::Error | AnalysisMode::ExecutionGas => self.on_detector_step(step),
        }
    }

    fn on_collector_step(&mut self, step: &StepEvent) -> Result<(), TraceError> {
        if self.access.is_stopped() {
            return Ok(());
        }
        // Hosts do not always frame the outermost call with explicit
        // enter/exit events; reconstruct a depth-1 halt from opcode
        // evidence so the finished-call list stays complete.
        if step.depth == 1
            && matches!(step.opcode, Opcode::RETURN | Opcode::REVERT)
            && self.frames.wants_top_level_halt()
        {
            let offset = stack_peek(step, 0)?;
            let len = stack_peek(step, 1)?;
            let data = memory_slice(&step.memory, offset, len, self.settings.max_capture_len);
            self.frames.on_top_level_halt(step.opcode, data);
        }
        self.access.on_step(step, &self.settings, self.state)
    }

    fn on_detector_step(&mut self, step: &StepEvent) -> Result<(), TraceError> {
        let phase = self.phases.current();
        if step.gas < step.gas_cost {
            if phase.is_validation() {
                self.validation_oog = true;
            }
            if phase.is_execution() {
                self.execution_oog = true;
            }
        }

        // The entry point emits its user-operation event at the top of
        // the call tree; correlate it into the report when seen.
        if step.depth <= 2 {
            if let Some(topic_count) = step.opcode.log_topic_count() {
                if topic_count >= 1
                    && step
                        .stack
                        .get(2)
                        .is_some_and(|&word| B256::from(word) == self.settings.user_op_event_topic)
                {
                    let offset = stack_peek(step, 0)?;
                    let len = stack_peek(step, 1)?;
                    let mut topics = Vec::with_capacity(topic_count);
                    for i in 0..topic_count {
                        topics.push(B256::from(stack_peek(step, 2 + i)?));
                    }
                    self.user_operation_event = Some(LogRecord {
                        topics,
                        data: memory_slice(
                            &step.memory,
                            offset,
                            len,
                            self.settings.max_capture_len,
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Replays a full event stream in one call and produces the report: a
/// pure function from event sequence, mode, and host state to a
/// [`Report`].
pub fn analyze<S: StateReader>(
    events: &[TraceEvent],
    mode: AnalysisMode,
    settings: Settings,
    state: &S,
    output: Bytes,
    error: Option<String>,
) -> Result<Report, TraceError> {
    let mut analyzer = TraceAnalyzer::new(mode, settings, state);
    for event in events {
        analyzer.on_event(event)?;
    }
    Ok(analyzer.finish(output, error))
}
