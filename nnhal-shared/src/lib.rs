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

#![cfg_attr(not(test), no_std)]

// Data structures describing a caller-supplied model. These are shared by
// the interface, the driver and the service component and carry no driver
// logic of their own.

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Operand element types. Values match the wire encoding.
#[repr(i32)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
pub enum OperandType {
    Float32 = 0,
    Int32 = 1,
    Uint32 = 2,
    TensorFloat32 = 3,
    TensorInt32 = 4,
    TensorQuant8Asymm = 5,
}
impl OperandType {
    pub fn is_tensor(&self) -> bool { !self.tensor_mask().is_empty() }

    /// Returns the single-bit mask for a tensor type, empty for scalars.
    pub fn tensor_mask(&self) -> OperandTypes {
        match self {
            OperandType::TensorFloat32 => OperandTypes::TENSOR_FLOAT32,
            OperandType::TensorInt32 => OperandTypes::TENSOR_INT32,
            OperandType::TensorQuant8Asymm => OperandTypes::TENSOR_QUANT8_ASYMM,
            OperandType::Float32 | OperandType::Int32 | OperandType::Uint32 => {
                OperandTypes::empty()
            }
        }
    }

    // Size in bytes of one element.
    pub fn element_size(&self) -> usize {
        match self {
            OperandType::TensorQuant8Asymm => 1,
            _ => 4,
        }
    }
}

bitflags::bitflags! {
    /// A set of tensor operand types, used by backends to describe what
    /// they accept.
    pub struct OperandTypes: u32 {
        const TENSOR_FLOAT32      = 0b00000001;
        const TENSOR_INT32        = 0b00000010;
        const TENSOR_QUANT8_ASYMM = 0b00000100;
    }
}

/// How an operand's value is produced and where it lives.
#[repr(i32)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
pub enum OperandLifeTime {
    TemporaryVariable = 0,
    ModelInput = 1,
    ModelOutput = 2,
    ConstantCopy = 3,
    ConstantReference = 4,
    NoValue = 5,
}
impl OperandLifeTime {
    pub fn is_constant(&self) -> bool {
        matches!(self, OperandLifeTime::ConstantCopy | OperandLifeTime::ConstantReference)
    }
}

/// Location of constant operand data. For ConstantCopy the pool_index is 0
/// and the range is into Model::operand_values; for ConstantReference it
/// names an entry in Model::pools.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataLocation {
    pub pool_index: u32,
    pub offset: u32,
    pub length: u32,
}
impl DataLocation {
    pub fn is_empty(&self) -> bool { self.pool_index == 0 && self.offset == 0 && self.length == 0 }

    // Returns the end of the range, or None on overflow.
    pub fn end(&self) -> Option<usize> {
        (self.offset as usize).checked_add(self.length as usize)
    }
}

/// A shared memory region backing ConstantReference operands. Only the size
/// is tracked; the contents are owned by the caller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemoryPool {
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub operand_type: OperandType,
    pub dimensions: Vec<u32>,
    pub number_of_consumers: u32,
    pub scale: f32,
    pub zero_point: i32,
    pub lifetime: OperandLifeTime,
    pub location: DataLocation,
}
impl Operand {
    pub fn tensor(operand_type: OperandType, dimensions: &[u32], lifetime: OperandLifeTime) -> Self {
        Self {
            operand_type,
            dimensions: dimensions.to_vec(),
            number_of_consumers: 0,
            scale: 0.0,
            zero_point: 0,
            lifetime,
            location: DataLocation::default(),
        }
    }

    pub fn scalar(operand_type: OperandType, lifetime: OperandLifeTime) -> Self {
        Self::tensor(operand_type, &[], lifetime)
    }

    pub fn rank(&self) -> usize { self.dimensions.len() }

    // Number of bytes the operand occupies when fully specified. Returns
    // None when any dimension is unknown (0) or the size overflows.
    pub fn byte_size(&self) -> Option<usize> {
        let mut size = self.operand_type.element_size();
        for &dim in &self.dimensions {
            if dim == 0 {
                return None;
            }
            size = size.checked_mul(dim as usize)?;
        }
        Some(size)
    }
}

/// Input/output count accepted by an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Exact(usize),
    OneOf(usize, usize),
    AtLeast(usize),
}
impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::OneOf(a, b) => count == a || count == b,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

/// The operation catalogue. Values match the wire encoding.
#[repr(i32)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
pub enum OperationType {
    Add = 0,
    AveragePool2d = 1,
    Concatenation = 2,
    Conv2d = 3,
    DepthwiseConv2d = 4,
    DepthToSpace = 5,
    Dequantize = 6,
    EmbeddingLookup = 7,
    Floor = 8,
    FullyConnected = 9,
    HashtableLookup = 10,
    L2Normalization = 11,
    L2Pool2d = 12,
    LocalResponseNormalization = 13,
    Logistic = 14,
    LshProjection = 15,
    Lstm = 16,
    MaxPool2d = 17,
    Mul = 18,
    Relu = 19,
    Relu1 = 20,
    Relu6 = 21,
    Reshape = 22,
    ResizeBilinear = 23,
    Rnn = 24,
    Softmax = 25,
    SpaceToDepth = 26,
    Svdf = 27,
    Tanh = 28,
    BatchToSpaceNd = 29,
    Div = 30,
    Mean = 31,
    Pad = 32,
    SpaceToBatchNd = 33,
    Squeeze = 34,
    StridedSlice = 35,
    Sub = 36,
    Transpose = 37,
}
impl OperationType {
    pub fn input_arity(&self) -> Arity {
        use OperationType::*;
        match self {
            Add | Mul | Sub | Div => Arity::Exact(3),
            AveragePool2d | MaxPool2d | L2Pool2d | Conv2d => Arity::OneOf(10, 7),
            DepthwiseConv2d => Arity::OneOf(11, 8),
            // N input tensors followed by the axis.
            Concatenation => Arity::AtLeast(2),
            FullyConnected | LshProjection => Arity::Exact(4),
            Softmax | Reshape | DepthToSpace | SpaceToDepth | EmbeddingLookup | Pad | Squeeze
            | Transpose | BatchToSpaceNd => Arity::Exact(2),
            Relu | Relu1 | Relu6 | Logistic | Tanh | Floor | Dequantize | L2Normalization => {
                Arity::Exact(1)
            }
            LocalResponseNormalization => Arity::Exact(5),
            ResizeBilinear | HashtableLookup | Mean | SpaceToBatchNd => Arity::Exact(3),
            StridedSlice | Svdf => Arity::Exact(7),
            Lstm => Arity::Exact(23),
            Rnn => Arity::Exact(6),
        }
    }

    pub fn output_count(&self) -> usize {
        use OperationType::*;
        match self {
            Lstm => 4,
            HashtableLookup | Rnn | Svdf => 2,
            _ => 1,
        }
    }

    /// Returns the input position of the fused activation code for an
    /// operation invoked with |input_count| inputs, if it has one.
    pub fn fused_activation_input(&self, input_count: usize) -> Option<usize> {
        use OperationType::*;
        match (self, input_count) {
            (Add | Mul | Sub | Div, 3) => Some(2),
            (FullyConnected, 4) => Some(3),
            (Conv2d | AveragePool2d | MaxPool2d | L2Pool2d, 10) => Some(9),
            (Conv2d | AveragePool2d | MaxPool2d | L2Pool2d, 7) => Some(6),
            (DepthwiseConv2d, 11) => Some(10),
            (DepthwiseConv2d, 8) => Some(7),
            _ => None,
        }
    }

    // Operations whose first input must be a 4-D (NHWC) tensor.
    pub fn requires_rank4(&self) -> bool {
        use OperationType::*;
        matches!(
            self,
            Conv2d
                | DepthwiseConv2d
                | AveragePool2d
                | MaxPool2d
                | L2Pool2d
                | L2Normalization
                | LocalResponseNormalization
                | ResizeBilinear
                | DepthToSpace
                | SpaceToDepth
        )
    }
}

/// Valid fused activation codes: NONE, RELU, RELU1, RELU6.
pub const MAX_FUSED_ACTIVATION: i32 = 3;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op_type: OperationType,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

/// A caller-supplied computation graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub operands: Vec<Operand>,
    pub operations: Vec<Operation>,
    pub input_indexes: Vec<u32>,
    pub output_indexes: Vec<u32>,
    pub operand_values: Vec<u8>,
    pub pools: Vec<MemoryPool>,
    pub relax_computation_float32_to_float16: bool,
}

impl Model {
    pub fn new() -> Self { Self::default() }

    pub fn operand(&self, index: u32) -> Option<&Operand> { self.operands.get(index as usize) }

    /// Appends |operand| and returns its index.
    pub fn add_operand(&mut self, operand: Operand) -> u32 {
        self.operands.push(operand);
        (self.operands.len() - 1) as u32
    }

    /// Appends |operand| as a ConstantCopy holding |bytes|.
    pub fn add_constant(&mut self, mut operand: Operand, bytes: &[u8]) -> u32 {
        operand.lifetime = OperandLifeTime::ConstantCopy;
        operand.location = DataLocation {
            pool_index: 0,
            offset: self.operand_values.len() as u32,
            length: bytes.len() as u32,
        };
        self.operand_values.extend_from_slice(bytes);
        self.add_operand(operand)
    }

    pub fn add_i32_constant(&mut self, value: i32) -> u32 {
        self.add_constant(
            Operand::scalar(OperandType::Int32, OperandLifeTime::ConstantCopy),
            &value.to_le_bytes(),
        )
    }

    pub fn add_operation(&mut self, op_type: OperationType, inputs: &[u32], outputs: &[u32]) {
        for &idx in inputs {
            if let Some(operand) = self.operands.get_mut(idx as usize) {
                operand.number_of_consumers += 1;
            }
        }
        self.operations.push(Operation {
            op_type,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        });
    }

    /// Returns the bytes backing a ConstantCopy operand, or None if the
    /// operand is not a copied constant or its range is out of bounds.
    pub fn constant_bytes(&self, operand: &Operand) -> Option<&[u8]> {
        if operand.lifetime != OperandLifeTime::ConstantCopy {
            return None;
        }
        let start = operand.location.offset as usize;
        self.operand_values.get(start..operand.location.end()?)
    }

    /// Reads a little-endian i32 scalar from a ConstantCopy operand.
    pub fn read_i32(&self, index: u32) -> Option<i32> {
        let operand = self.operand(index)?;
        let bytes: [u8; 4] = self.constant_bytes(operand)?.try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }

    /// Total bytes of constant data, copied and referenced.
    pub fn constant_data_size(&self) -> usize {
        self.operands
            .iter()
            .filter(|o| o.lifetime.is_constant())
            .map(|o| o.location.length as usize)
            .sum()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "model[{} operands, {} operations, {} inputs, {} outputs]",
            self.operands.len(),
            self.operations.len(),
            self.input_indexes.len(),
            self.output_indexes.len()
        )
    }
}
