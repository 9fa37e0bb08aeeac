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

// Accelerator (VPU) backend.
//
// The accelerator loads a whole graph at once: constant data must fit in
// device memory and every model input must have a fully known shape.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{error, info};
use nnhal_interface::{InitializeError, PreparedModel};
use nnhal_shared::{Model, OperandTypes, OperationType};

use super::{lower, Layer, VPU_BACKEND};
use crate::capabilities::VPU_CAPABILITIES;
use crate::selector::BackendDescriptor;
use crate::validator::SupportTable;

/// Device memory available for constant operands.
pub const VPU_MAX_CONSTANT_BYTES: usize = 64 * 1024 * 1024;

pub static VPU_SUPPORT: SupportTable = SupportTable {
    operations: &[
        OperationType::Add,
        OperationType::AveragePool2d,
        OperationType::Concatenation,
        OperationType::Conv2d,
        OperationType::DepthwiseConv2d,
        OperationType::FullyConnected,
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
    tensor_types: OperandTypes::TENSOR_FLOAT32,
    relaxed_computation: true,
    max_rank: 4,
};

pub struct VpuPreparedModel {
    model: Model,
    layers: Vec<Layer>,
    max_constant_bytes: usize,
}
impl VpuPreparedModel {
    pub fn new(model: &Model) -> Self { Self::with_memory_limit(model, VPU_MAX_CONSTANT_BYTES) }

    pub fn with_memory_limit(model: &Model, max_constant_bytes: usize) -> Self {
        Self {
            model: model.clone(),
            layers: Vec::new(),
            max_constant_bytes,
        }
    }

    pub fn layers(&self) -> &[Layer] { &self.layers }

    fn check_device_limits(&self) -> Result<(), InitializeError> {
        let constant_bytes = self.model.constant_data_size();
        if constant_bytes > self.max_constant_bytes {
            error!(
                "{}: {} bytes of constants exceed device memory ({})",
                VPU_BACKEND, constant_bytes, self.max_constant_bytes
            );
            return Err(InitializeError::BackendFailure);
        }
        for &idx in &self.model.input_indexes {
            let operand = self.model.operand(idx).ok_or(InitializeError::ModelCorrupted)?;
            if operand.byte_size().is_none() {
                error!("{}: input {} has unknown dimensions {:?}", VPU_BACKEND, idx, operand.dimensions);
                return Err(InitializeError::BackendFailure);
            }
        }
        Ok(())
    }
}
impl PreparedModel for VpuPreparedModel {
    fn backend_name(&self) -> &str { VPU_BACKEND }
    fn model(&self) -> &Model { &self.model }
    fn initialize(&mut self) -> Result<(), InitializeError> {
        let layers = lower(&self.model)?;
        self.check_device_limits()?;
        self.layers = layers;
        info!("{}: loaded graph with {} layers", VPU_BACKEND, self.layers.len());
        Ok(())
    }
}

pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::new(VPU_BACKEND, VPU_CAPABILITIES, &VPU_SUPPORT, |model: &Model| {
        Box::new(VpuPreparedModel::new(model)) as Box<dyn PreparedModel>
    })
}
