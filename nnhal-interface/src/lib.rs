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

//! Caller-visible contract of the NN HAL driver: status codes, capability
//! records, the prepared-model and callback traits, and the serialized
//! request/response types used by the service component.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::trace;
use nnhal_shared::Model;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use static_assertions::assert_obj_safe;

/// Status codes returned synchronously and delivered through
/// PreparedModelCallback::notify. Values match the wire encoding.
#[repr(i32)]
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, FromPrimitive, IntoPrimitive,
)]
pub enum ErrorStatus {
    None = 0,
    DeviceUnavailable = 1,
    #[default]
    GeneralFailure = 2,
    OutputInsufficientSize = 3,
    InvalidArgument = 4,
}
impl From<ErrorStatus> for Result<(), ErrorStatus> {
    fn from(err: ErrorStatus) -> Result<(), ErrorStatus> {
        if err == ErrorStatus::None {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[repr(i32)]
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, FromPrimitive, IntoPrimitive,
)]
pub enum DeviceStatus {
    Available = 0,
    Busy = 1,
    Offline = 2,
    #[default]
    Unknown = 3,
}

/// Caller hint for how a prepared model will be used. Callers hand over the
/// raw wire value; anything outside these three is rejected.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive)]
pub enum ExecutionPreference {
    LowPower = 0,
    FastSingleAnswer = 1,
    SustainedSpeed = 2,
}
impl ExecutionPreference {
    /// Decodes a raw preference, returning None for unknown values.
    pub fn from_raw(value: i32) -> Option<Self> {
        let pref = Self::try_from(value).ok();
        trace!("execution preference {} -> {:?}", value, pref);
        pref
    }
}

/// Relative performance of a backend for one data type; lower is better.
/// A zero record means "not advertised".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInfo {
    pub exec_time: f32,
    pub power_usage: f32,
}
impl PerformanceInfo {
    pub const fn new(exec_time: f32, power_usage: f32) -> Self {
        Self {
            exec_time,
            power_usage,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub float32_performance: PerformanceInfo,
    pub quantized8_performance: PerformanceInfo,
    pub relaxed_float32_to_float16_performance: PerformanceInfo,
}
impl Capabilities {
    /// The subset visible to 1.0 callers, which have no notion of relaxed
    /// computation.
    pub fn legacy(&self) -> Self {
        Self {
            float32_performance: self.float32_performance,
            quantized8_performance: self.quantized8_performance,
            relaxed_float32_to_float16_performance: PerformanceInfo::default(),
        }
    }
}

/// Reasons a backend may fail to initialize a prepared model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitializeError {
    /// The backend found the model internally inconsistent while lowering
    /// it (e.g. constant data that does not match its operand).
    ModelCorrupted,
    /// The model is well-formed but the backend could not prepare it.
    BackendFailure,
}

/// Backend-specific preparation handle. Built by a backend factory from a
/// model, initialized once by the driver and, on success, handed to the
/// caller who owns it from then on.
pub trait PreparedModel: Send + Sync {
    fn backend_name(&self) -> &str;
    fn model(&self) -> &Model;
    // May perform arbitrarily long synchronous work.
    fn initialize(&mut self) -> Result<(), InitializeError>;
}

/// One-shot channel through which prepare_model reports its outcome.
/// |prepared_model| is Some only when |status| is ErrorStatus::None.
pub trait PreparedModelCallback: Send + Sync {
    fn notify(&self, status: ErrorStatus, prepared_model: Option<Box<dyn PreparedModel>>);
}

assert_obj_safe!(PreparedModel, PreparedModelCallback);

/// Index of a prepared model held by the service component.
pub type PreparedModelId = u32;

// Size of the buffers used to pass serialized requests and replies to the
// service component. Requests carry a whole model so they dominate.
pub const NNHAL_REQUEST_DATA_SIZE: usize = 8192;
pub const NNHAL_REPLY_DATA_SIZE: usize = 2048;

#[derive(Debug, Serialize, Deserialize)]
pub enum NnhalRequest {
    GetStatus,                     // -> GetStatusResponse
    GetCapabilities,               // -> GetCapabilitiesResponse
    GetLegacyCapabilities,         // -> GetCapabilitiesResponse
    GetSupportedOperations(Model), // -> GetSupportedOperationsResponse
    PrepareModel {
        // -> PrepareModelResponse
        model: Model,
        preference: i32,
    },
    ReleasePreparedModel(PreparedModelId), // -> ()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetStatusResponse {
    pub status: DeviceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetCapabilitiesResponse {
    pub status: ErrorStatus,
    pub capabilities: Capabilities,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetSupportedOperationsResponse {
    pub status: ErrorStatus,
    pub supported: Vec<bool>,
}

/// Both result channels of a prepare_model call: the synchronous |status|
/// and the |notification| delivered to the callback, if any. A successful
/// notification comes with the slot holding the prepared model.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareModelResponse {
    pub status: ErrorStatus,
    pub notification: Option<ErrorStatus>,
    pub prepared_model: Option<PreparedModelId>,
}
