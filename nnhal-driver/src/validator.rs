// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Model and operation validation.
//
// Two kinds of findings are kept apart: a model may be well-formed but use
// something the backend does not support, or it may be internally
// inconsistent (operand references out of range, malformed operations,
// constant data outside its pool). The latter is reported as corruption.
// Every result is returned to the caller; nothing is recorded in shared
// state, so concurrent validations cannot see each other's findings.

use log::trace;
use nnhal_shared::{Model, OperandLifeTime, OperandTypes, Operation, OperationType};
use nnhal_shared::MAX_FUSED_ACTIVATION;

/// What a backend accepts.
#[derive(Debug)]
pub struct SupportTable {
    pub operations: &'static [OperationType],
    pub tensor_types: OperandTypes,
    pub relaxed_computation: bool,
    pub max_rank: usize,
}
impl SupportTable {
    pub fn supports(&self, op_type: OperationType) -> bool { self.operations.contains(&op_type) }
}

/// Per-operation verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationSupport {
    Supported,
    Unsupported,
    Corrupted,
}

/// Whole-model verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub corruption_detected: bool,
}
impl ValidationOutcome {
    pub const fn valid() -> Self {
        Self {
            valid: true,
            corruption_detected: false,
        }
    }
    pub const fn unsupported() -> Self {
        Self {
            valid: false,
            corruption_detected: false,
        }
    }
    pub const fn corrupted() -> Self {
        Self {
            valid: false,
            corruption_detected: true,
        }
    }

    fn record(&mut self, support: OperationSupport) {
        match support {
            OperationSupport::Supported => {}
            OperationSupport::Unsupported => self.valid = false,
            OperationSupport::Corrupted => *self = Self::corrupted(),
        }
    }
}

/// Checks one operation of |model| against |table|.
pub fn check_operation(op: &Operation, model: &Model, table: &SupportTable) -> OperationSupport {
    let num_operands = model.operands.len();
    if let Some(idx) = op
        .inputs
        .iter()
        .chain(op.outputs.iter())
        .find(|idx| **idx as usize >= num_operands)
    {
        trace!("{:?}: operand {} out of range ({} operands)", op.op_type, idx, num_operands);
        return OperationSupport::Corrupted;
    }
    if !op.op_type.input_arity().accepts(op.inputs.len())
        || op.outputs.len() != op.op_type.output_count()
    {
        trace!(
            "{:?}: malformed, {} inputs {} outputs",
            op.op_type,
            op.inputs.len(),
            op.outputs.len()
        );
        return OperationSupport::Corrupted;
    }

    if !table.supports(op.op_type) {
        trace!("{:?}: not supported by backend", op.op_type);
        return OperationSupport::Unsupported;
    }

    // NB: arity guarantees at least one input.
    let primary = &model.operands[op.inputs[0] as usize];
    if !primary.operand_type.is_tensor() {
        trace!("{:?}: primary input is a scalar", op.op_type);
        return OperationSupport::Unsupported;
    }
    if op.op_type.requires_rank4() && primary.rank() != 4 {
        trace!("{:?}: needs a 4-D input, got rank {}", op.op_type, primary.rank());
        return OperationSupport::Unsupported;
    }
    for &idx in op.inputs.iter().chain(op.outputs.iter()) {
        let operand = &model.operands[idx as usize];
        if !operand.operand_type.is_tensor() {
            continue;
        }
        if !table.tensor_types.contains(operand.operand_type.tensor_mask()) {
            trace!("{:?}: operand {} type {:?}", op.op_type, idx, operand.operand_type);
            return OperationSupport::Unsupported;
        }
        if operand.rank() > table.max_rank {
            trace!("{:?}: operand {} rank {}", op.op_type, idx, operand.rank());
            return OperationSupport::Unsupported;
        }
    }

    if let Some(pos) = op.op_type.fused_activation_input(op.inputs.len()) {
        // Only constant codes can be checked here; others are left to the
        // backend.
        if let Some(code) = model.read_i32(op.inputs[pos]) {
            if !(0..=MAX_FUSED_ACTIVATION).contains(&code) {
                trace!("{:?}: fused activation {}", op.op_type, code);
                return OperationSupport::Unsupported;
            }
        }
    }

    OperationSupport::Supported
}

pub fn is_operation_supported(op: &Operation, model: &Model, table: &SupportTable) -> bool {
    check_operation(op, model, table) == OperationSupport::Supported
}

/// Checks the operand table and the model input/output lists. Any finding
/// here is corruption.
pub fn check_structure(model: &Model) -> ValidationOutcome {
    for (idx, operand) in model.operands.iter().enumerate() {
        if !operand.operand_type.is_tensor() && !operand.dimensions.is_empty() {
            trace!("operand {}: scalar with dimensions", idx);
            return ValidationOutcome::corrupted();
        }
        let location = &operand.location;
        let in_bounds = match operand.lifetime {
            OperandLifeTime::ConstantCopy => {
                location.pool_index == 0
                    && location.end().map_or(false, |end| end <= model.operand_values.len())
            }
            OperandLifeTime::ConstantReference => {
                match model.pools.get(location.pool_index as usize) {
                    Some(pool) => location.end().map_or(false, |end| end <= pool.size as usize),
                    None => false,
                }
            }
            _ => location.is_empty(),
        };
        if !in_bounds {
            trace!("operand {}: bad location {:?} for {:?}", idx, location, operand.lifetime);
            return ValidationOutcome::corrupted();
        }
    }

    let lifetime_matches = |idx: &u32, lifetime: OperandLifeTime| {
        model
            .operand(*idx)
            .map_or(false, |operand| operand.lifetime == lifetime)
    };
    if !model
        .input_indexes
        .iter()
        .all(|idx| lifetime_matches(idx, OperandLifeTime::ModelInput))
    {
        trace!("model inputs inconsistent: {:?}", model.input_indexes);
        return ValidationOutcome::corrupted();
    }
    if !model
        .output_indexes
        .iter()
        .all(|idx| lifetime_matches(idx, OperandLifeTime::ModelOutput))
    {
        trace!("model outputs inconsistent: {:?}", model.output_indexes);
        return ValidationOutcome::corrupted();
    }

    ValidationOutcome::valid()
}

/// Structural gate shared by validation and support queries. A model
/// with no operations passes without further checks.
pub fn check_model(model: &Model) -> ValidationOutcome {
    if model.operations.is_empty() {
        return ValidationOutcome::valid();
    }
    check_structure(model)
}

/// Validates the whole of |model| against |table|. A model with no
/// operations is trivially valid.
pub fn valid_model(model: &Model, table: &SupportTable) -> ValidationOutcome {
    let mut outcome = check_model(model);
    if outcome.corruption_detected {
        return outcome;
    }
    if model.relax_computation_float32_to_float16 && !table.relaxed_computation {
        trace!("relaxed computation not supported");
        outcome.valid = false;
    }
    // NB: every operation is checked so corruption anywhere is reported.
    for op in &model.operations {
        outcome.record(check_operation(op, model, table));
    }
    outcome
}
