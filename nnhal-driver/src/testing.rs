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

// Models and fakes shared by the unit tests.

use crate::selector::{BackendDescriptor, BackendRegistry};
use crate::validator::SupportTable;
use nnhal_interface::{Capabilities, InitializeError, PreparedModel};
use nnhal_shared::{Model, Operand, OperandLifeTime, OperandType, OperandTypes, OperationType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SHAPE: [u32; 4] = [1, 2, 2, 1];

fn float_tensor(model: &mut Model, dims: &[u32], lifetime: OperandLifeTime) -> u32 {
    model.add_operand(Operand::tensor(OperandType::TensorFloat32, dims, lifetime))
}

fn unary_model(operand_type: OperandType, op_type: OperationType) -> Model {
    let mut model = Model::new();
    let input = model.add_operand(Operand::tensor(operand_type, &SHAPE, OperandLifeTime::ModelInput));
    let output =
        model.add_operand(Operand::tensor(operand_type, &SHAPE, OperandLifeTime::ModelOutput));
    model.add_operation(op_type, &[input], &[output]);
    model.input_indexes = vec![input];
    model.output_indexes = vec![output];
    model
}

/// input -> RELU -> output
pub fn relu_model() -> Model { unary_model(OperandType::TensorFloat32, OperationType::Relu) }

pub fn quant8_relu_model() -> Model {
    unary_model(OperandType::TensorQuant8Asymm, OperationType::Relu)
}

/// input -> RELU -> LOGISTIC -> FLOOR -> output
pub fn mixed_model() -> Model {
    let mut model = Model::new();
    let input = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let t1 = float_tensor(&mut model, &SHAPE, OperandLifeTime::TemporaryVariable);
    let t2 = float_tensor(&mut model, &SHAPE, OperandLifeTime::TemporaryVariable);
    let output = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelOutput);
    model.add_operation(OperationType::Relu, &[input], &[t1]);
    model.add_operation(OperationType::Logistic, &[t1], &[t2]);
    model.add_operation(OperationType::Floor, &[t2], &[output]);
    model.input_indexes = vec![input];
    model.output_indexes = vec![output];
    model
}

/// Same graph as relu_model followed by LOGISTIC, but with the operations
/// listed consumer first.
pub fn out_of_order_model() -> Model {
    let mut model = Model::new();
    let input = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let t1 = float_tensor(&mut model, &SHAPE, OperandLifeTime::TemporaryVariable);
    let output = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelOutput);
    model.add_operation(OperationType::Logistic, &[t1], &[output]);
    model.add_operation(OperationType::Relu, &[input], &[t1]);
    model.input_indexes = vec![input];
    model.output_indexes = vec![output];
    model
}

/// a + b with a constant fused |activation| code.
pub fn add_model(activation: i32) -> Model {
    let mut model = Model::new();
    let a = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let b = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let act = model.add_i32_constant(activation);
    let output = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelOutput);
    model.add_operation(OperationType::Add, &[a, b, act], &[output]);
    model.input_indexes = vec![a, b];
    model.output_indexes = vec![output];
    model
}

/// a + b with the activation code supplied at execution time.
pub fn add_model_dynamic_activation() -> Model {
    let mut model = Model::new();
    let a = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let b = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelInput);
    let act = model.add_operand(Operand::scalar(OperandType::Int32, OperandLifeTime::ModelInput));
    let output = float_tensor(&mut model, &SHAPE, OperandLifeTime::ModelOutput);
    model.add_operation(OperationType::Add, &[a, b, act], &[output]);
    model.input_indexes = vec![a, b, act];
    model.output_indexes = vec![output];
    model
}

/// 1x1 CONV_2D with implicit padding over an input of |dims|, producing two
/// output channels.
pub fn conv_model(dims: &[u32]) -> Model {
    let in_channels = *dims.last().unwrap();
    let mut out_dims = dims.to_vec();
    *out_dims.last_mut().unwrap() = 2;

    let mut model = Model::new();
    let input = float_tensor(&mut model, dims, OperandLifeTime::ModelInput);
    let filter = model.add_constant(
        Operand::tensor(OperandType::TensorFloat32, &[2, 1, 1, in_channels], OperandLifeTime::ConstantCopy),
        &vec![0u8; 4 * 2 * in_channels as usize],
    );
    let bias = model.add_constant(
        Operand::tensor(OperandType::TensorFloat32, &[2], OperandLifeTime::ConstantCopy),
        &[0u8; 8],
    );
    let padding = model.add_i32_constant(1);
    let stride_w = model.add_i32_constant(1);
    let stride_h = model.add_i32_constant(1);
    let act = model.add_i32_constant(0);
    let output = float_tensor(&mut model, &out_dims, OperandLifeTime::ModelOutput);
    model.add_operation(
        OperationType::Conv2d,
        &[input, filter, bias, padding, stride_w, stride_h, act],
        &[output],
    );
    model.input_indexes = vec![input];
    model.output_indexes = vec![output];
    model
}

pub static FAKE_SUPPORT: SupportTable = SupportTable {
    operations: &[OperationType::Relu, OperationType::Logistic, OperationType::Add],
    tensor_types: OperandTypes::TENSOR_FLOAT32,
    relaxed_computation: true,
    max_rank: 4,
};

/// A prepared model whose initialize() returns a canned result.
pub struct FakePreparedModel {
    model: Model,
    result: Result<(), InitializeError>,
    initialized: Arc<AtomicUsize>,
}
impl PreparedModel for FakePreparedModel {
    fn backend_name(&self) -> &str { "FAKE" }
    fn model(&self) -> &Model { &self.model }
    fn initialize(&mut self) -> Result<(), InitializeError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        self.result
    }
}

/// Counts factory and initialize() invocations of a fake backend.
#[derive(Clone, Default)]
pub struct FakeCounters {
    pub selected: Arc<AtomicUsize>,
    pub initialized: Arc<AtomicUsize>,
}
impl FakeCounters {
    pub fn selected(&self) -> usize { self.selected.load(Ordering::SeqCst) }
    pub fn initialized(&self) -> usize { self.initialized.load(Ordering::SeqCst) }
}

/// Returns a registry holding a single "FAKE" backend whose prepared
/// models initialize to |result|.
pub fn fake_registry(result: Result<(), InitializeError>) -> (BackendRegistry, FakeCounters) {
    let counters = FakeCounters::default();
    let factory_counters = counters.clone();
    let mut registry = BackendRegistry::new();
    registry.register(BackendDescriptor::new(
        "FAKE",
        Capabilities::default(),
        &FAKE_SUPPORT,
        move |model: &Model| -> Box<dyn PreparedModel> {
            factory_counters.selected.fetch_add(1, Ordering::SeqCst);
            Box::new(FakePreparedModel {
                model: model.clone(),
                result,
                initialized: factory_counters.initialized.clone(),
            })
        },
    ));
    (registry, counters)
}
