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

//! NN HAL driver: backend capability negotiation and model preparation.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use log::{error, info, trace};
use nnhal_interface::{Capabilities, DeviceStatus, ErrorStatus, ExecutionPreference};
use nnhal_interface::PreparedModelCallback;
use nnhal_shared::Model;
use static_assertions::assert_impl_all;

pub mod backends;
pub mod callback;
pub mod capabilities;
pub mod prepare;
pub mod selector;
pub mod validator;

#[cfg(test)]
mod testing;

use capabilities::capabilities_for;
use prepare::{PrepareModelTask, PrepareOutcome};
use selector::BackendRegistry;
use validator::{check_model, check_operation, OperationSupport};

/// A driver instance bound to one backend identity.
pub struct Driver {
    name: String,
    registry: BackendRegistry,
}
impl Driver {
    /// Creates a driver for backend |name| with the stock backends.
    pub fn new(name: &str) -> Self { Self::with_registry(name, BackendRegistry::default()) }

    pub fn with_registry(name: &str, registry: BackendRegistry) -> Self {
        trace!("driver {} with backends {:?}", name, registry.names());
        Self {
            name: String::from(name),
            registry,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn registry(&self) -> &BackendRegistry { &self.registry }

    pub fn get_status(&self) -> DeviceStatus { DeviceStatus::Available }

    /// Returns the capabilities registered for this driver's backend, or
    /// the built-in record for its name.
    pub fn get_capabilities(&self) -> (ErrorStatus, Capabilities) {
        info!("get_capabilities {}", self.name);
        let capabilities = match self.registry.lookup(&self.name) {
            Some(descriptor) => descriptor.capabilities,
            None => capabilities_for(&self.name),
        };
        (ErrorStatus::None, capabilities)
    }

    pub fn get_capabilities_1_0(&self) -> (ErrorStatus, Capabilities) {
        let (status, capabilities) = self.get_capabilities();
        (status, capabilities.legacy())
    }

    /// Reports, for each operation of |model| in order, whether this
    /// driver's backend supports it. The vector always has one entry per
    /// operation; the status is InvalidArgument if the model is corrupt.
    pub fn get_supported_operations(&self, model: &Model) -> (ErrorStatus, Vec<bool>) {
        info!("get_supported_operations {} on {}", model, self.name);
        let count = model.operations.len();
        let descriptor = match self.registry.lookup(&self.name) {
            Some(descriptor) => descriptor,
            None => {
                error!("get_supported_operations: no backend {}", self.name);
                return (ErrorStatus::GeneralFailure, vec![false; count]);
            }
        };
        if check_model(model).corruption_detected {
            error!("get_supported_operations: model is corrupt");
            return (ErrorStatus::InvalidArgument, vec![true; count]);
        }

        let mut supported = vec![true; count];
        let mut corruption_detected = false;
        for (entry, op) in supported.iter_mut().zip(model.operations.iter()) {
            match check_operation(op, model, descriptor.support) {
                OperationSupport::Supported => {}
                OperationSupport::Unsupported => *entry = false,
                OperationSupport::Corrupted => {
                    *entry = false;
                    corruption_detected = true;
                }
            }
        }
        if corruption_detected {
            error!("get_supported_operations: corrupt operation in {}", model);
            return (ErrorStatus::InvalidArgument, supported);
        }
        (ErrorStatus::None, supported)
    }

    /// Prepares |model| and returns both result channels.
    pub fn prepare(
        &self,
        model: &Model,
        preference: i32,
        callback: Option<Arc<dyn PreparedModelCallback>>,
    ) -> PrepareOutcome {
        info!("prepare_model {} on {} preference {}", model, self.name, preference);
        PrepareModelTask::new(&self.registry, &self.name, model).run(preference, callback)
    }

    /// Prepares |model| for execution, reporting through |callback|.
    ///
    /// The returned status is the synchronous answer. The callback, when
    /// present, receives the detailed outcome and the prepared model on
    /// success. The two may disagree: a backend that fails to initialize
    /// a valid model returns None here and notifies GeneralFailure. An
    /// unknown backend or a missing callback returns InvalidArgument
    /// without notifying.
    pub fn prepare_model(
        &self,
        model: &Model,
        preference: i32,
        callback: Option<Arc<dyn PreparedModelCallback>>,
    ) -> ErrorStatus {
        self.prepare(model, preference, callback).status
    }

    pub fn prepare_model_1_0(
        &self,
        model: &Model,
        callback: Option<Arc<dyn PreparedModelCallback>>,
    ) -> ErrorStatus {
        self.prepare_model(model, ExecutionPreference::FastSingleAnswer.into(), callback)
    }
}

assert_impl_all!(Driver: Send, Sync);
