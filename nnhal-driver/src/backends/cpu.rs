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

// General-purpose CPU backend.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::info;
use nnhal_interface::{InitializeError, PreparedModel};
use nnhal_shared::{Model, OperandTypes, OperationType};

use super::{lower, Layer, CPU_BACKEND};
use crate::capabilities::CPU_CAPABILITIES;
use crate::selector::BackendDescriptor;
use crate::validator::SupportTable;

pub static CPU_SUPPORT: SupportTable = SupportTable {
    operations: &[
        OperationType::Add,
        OperationType::AveragePool2d,
        OperationType::Concatenation,
        OperationType::Conv2d,
        OperationType::DepthwiseConv2d,
        OperationType::FullyConnected,
        OperationType::L2Normalization,
        OperationType::LocalResponseNormalization,
        OperationType::Logistic,
        OperationType::MaxPool2d,
        OperationType::Mul,
        OperationType::Relu,
        OperationType::Relu1,
        OperationType::Relu6,
        OperationType::Reshape,
        OperationType::Softmax,
        OperationType::Tanh,
    ],
    tensor_types: OperandTypes::from_bits_truncate(
        OperandTypes::TENSOR_FLOAT32.bits() | OperandTypes::TENSOR_QUANT8_ASYMM.bits(),
    ),
    relaxed_computation: true,
    max_rank: 4,
};

pub struct CpuPreparedModel {
    model: Model,
    layers: Vec<Layer>,
}
impl CpuPreparedModel {
    pub fn new(model: &Model) -> Self {
        Self {
            model: model.clone(),
            layers: Vec::new(),
        }
    }

    /// Layers built by initialize(); empty before then.
    pub fn layers(&self) -> &[Layer] { &self.layers }
}
impl PreparedModel for CpuPreparedModel {
    fn backend_name(&self) -> &str { CPU_BACKEND }
    fn model(&self) -> &Model { &self.model }
    fn initialize(&mut self) -> Result<(), InitializeError> {
        self.layers = lower(&self.model)?;
        info!("{}: prepared {} layers", CPU_BACKEND, self.layers.len());
        Ok(())
    }
}

pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::new(CPU_BACKEND, CPU_CAPABILITIES, &CPU_SUPPORT, |model: &Model| {
        Box::new(CpuPreparedModel::new(model)) as Box<dyn PreparedModel>
    })
}
