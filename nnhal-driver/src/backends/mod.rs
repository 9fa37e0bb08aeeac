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

// Stock backends and the graph lowering they share.
//
// Lowering walks the operations in order and turns each into a Layer.
// Along the way it checks what validation cannot: that every temporary is
// produced before it is consumed, that constant data matches the size of
// its operand and that fused activations can be folded.

use alloc::vec::Vec;
use log::{error, trace};
use nnhal_interface::InitializeError;
use nnhal_shared::{Model, Operand, OperandLifeTime, OperationType};

pub mod cpu;
pub mod vpu;

pub const CPU_BACKEND: &str = "CPU";
pub const VPU_BACKEND: &str = "VPU";

/// One lowered operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layer {
    pub op_type: OperationType,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
    pub activation: Option<i32>,
}

// Constant data must be in range and exactly the size of its operand.
fn check_constant(model: &Model, idx: u32, operand: &Operand) -> Result<(), InitializeError> {
    let length = match operand.lifetime {
        OperandLifeTime::ConstantCopy => model
            .constant_bytes(operand)
            .map(|bytes| bytes.len())
            .ok_or(InitializeError::ModelCorrupted)?,
        OperandLifeTime::ConstantReference => {
            let pool = model
                .pools
                .get(operand.location.pool_index as usize)
                .ok_or(InitializeError::ModelCorrupted)?;
            match operand.location.end() {
                Some(end) if end <= pool.size as usize => operand.location.length as usize,
                _ => return Err(InitializeError::ModelCorrupted),
            }
        }
        _ => return Ok(()),
    };
    match operand.byte_size() {
        Some(expected) if expected != length => {
            error!("operand {}: {} bytes of constant data, expected {}", idx, length, expected);
            Err(InitializeError::ModelCorrupted)
        }
        _ => Ok(()),
    }
}

/// Lowers |model| into an ordered list of layers.
pub fn lower(model: &Model) -> Result<Vec<Layer>, InitializeError> {
    // Operands available before the first operation runs.
    let mut produced: Vec<bool> = model
        .operands
        .iter()
        .map(|o| {
            o.lifetime.is_constant()
                || matches!(o.lifetime, OperandLifeTime::ModelInput | OperandLifeTime::NoValue)
        })
        .collect();

    let mut layers = Vec::with_capacity(model.operations.len());
    for op in &model.operations {
        for &idx in &op.inputs {
            let operand = model.operand(idx).ok_or(InitializeError::ModelCorrupted)?;
            check_constant(model, idx, operand)?;
            if !produced[idx as usize] {
                error!("{:?}: operand {} consumed before it is produced", op.op_type, idx);
                return Err(InitializeError::ModelCorrupted);
            }
        }
        let activation = match op.op_type.fused_activation_input(op.inputs.len()) {
            Some(pos) => {
                let idx = *op.inputs.get(pos).ok_or(InitializeError::ModelCorrupted)?;
                match model.read_i32(idx) {
                    Some(code) => Some(code),
                    None => {
                        // Activation must be known when the graph is built.
                        error!("{:?}: fused activation operand {} is not constant", op.op_type, idx);
                        return Err(InitializeError::BackendFailure);
                    }
                }
            }
            None => None,
        };
        for &idx in &op.outputs {
            let slot = produced
                .get_mut(idx as usize)
                .ok_or(InitializeError::ModelCorrupted)?;
            *slot = true;
        }
        layers.push(Layer {
            op_type: op.op_type,
            inputs: op.inputs.clone(),
            outputs: op.outputs.clone(),
            activation,
        });
    }

    for &idx in &model.output_indexes {
        if !produced.get(idx as usize).copied().unwrap_or(false) {
            error!("model output {} is never produced", idx);
            return Err(InitializeError::ModelCorrupted);
        }
    }
    trace!("lowered {} into {} layers", model, layers.len());
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use nnhal_shared::{DataLocation, MemoryPool, OperandType};

    #[test]
    fn test_lower_chain() {
        let model = mixed_model();
        let layers = lower(&model).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].op_type, OperationType::Relu);
        assert_eq!(layers[2].op_type, OperationType::Floor);
        assert!(layers.iter().all(|l| l.activation.is_none()));
    }

    #[test]
    fn test_lower_folds_activation() {
        let layers = lower(&add_model(1)).unwrap();
        assert_eq!(layers[0].activation, Some(1));
        let layers = lower(&conv_model(&[1, 4, 4, 3])).unwrap();
        assert_eq!(layers[0].activation, Some(0));
    }

    #[test]
    fn test_lower_dynamic_activation_fails() {
        assert_eq!(
            lower(&add_model_dynamic_activation()),
            Err(InitializeError::BackendFailure)
        );
    }

    #[test]
    fn test_lower_out_of_order() {
        assert_eq!(lower(&out_of_order_model()), Err(InitializeError::ModelCorrupted));
    }

    #[test]
    fn test_lower_constant_size_mismatch() {
        let mut model = conv_model(&[1, 4, 4, 3]);
        let bias = model
            .operands
            .iter()
            .position(|o| o.lifetime.is_constant() && o.dimensions == [2])
            .unwrap();
        // Still inside operand_values but shorter than a [2] float tensor.
        model.operands[bias].location.length = 4;
        assert_eq!(lower(&model), Err(InitializeError::ModelCorrupted));
    }

    #[test]
    fn test_lower_constant_reference() {
        let mut model = relu_model();
        let mut weights =
            Operand::tensor(OperandType::TensorFloat32, &SHAPE_1, OperandLifeTime::ConstantReference);
        weights.location = DataLocation {
            pool_index: 0,
            offset: 4,
            length: 16,
        };
        let weights = model.add_operand(weights);
        let output = model.output_indexes[0];
        let sum = model.add_operand(Operand::tensor(
            OperandType::TensorFloat32,
            &SHAPE_1,
            OperandLifeTime::ModelOutput,
        ));
        let act = model.add_i32_constant(0);
        model.add_operation(OperationType::Add, &[output, weights, act], &[sum]);
        model.output_indexes.push(sum);

        // Pool too small for offset + length.
        model.pools.push(MemoryPool { size: 16 });
        assert_eq!(lower(&model), Err(InitializeError::ModelCorrupted));
        model.pools[0].size = 20;
        assert_eq!(lower(&model).unwrap().len(), 2);
    }

    #[test]
    fn test_lower_unproduced_output() {
        let mut model = relu_model();
        let dangling = model.add_operand(Operand::tensor(
            OperandType::TensorFloat32,
            &SHAPE_1,
            OperandLifeTime::ModelOutput,
        ));
        model.output_indexes.push(dangling);
        assert_eq!(lower(&model), Err(InitializeError::ModelCorrupted));
    }

    const SHAPE_1: [u32; 4] = [1, 2, 2, 1];
}
