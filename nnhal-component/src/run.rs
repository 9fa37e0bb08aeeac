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

//! NN HAL service component.
//!
//! Requests and replies are postcard-encoded. Prepared models stay in the
//! component; callers refer to them by slot index.

use static_assertions::assert_cfg;
assert_cfg!(
    any(feature = "cpu_backend", feature = "vpu_backend"),
    "No backend configured"
);
assert_cfg!(
    not(all(feature = "cpu_backend", feature = "vpu_backend")),
    "Only one backend may be specified"
);

use log::{error, info, trace};
use nnhal_driver::callback::OneshotCallback;
use nnhal_driver::Driver;
use nnhal_interface::{GetCapabilitiesResponse, GetStatusResponse};
use nnhal_interface::{GetSupportedOperationsResponse, PrepareModelResponse};
use nnhal_interface::{NnhalRequest, PreparedModel, PreparedModelCallback, PreparedModelId};
use nnhal_shared::Model;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;
use spin::{Lazy, Mutex};
use std::sync::Arc;

mod logger;
pub use logger::{init_logger, NnhalLogger, MAX_MSG_LEN};

#[cfg(feature = "cpu_backend")]
use nnhal_driver::backends::CPU_BACKEND as BACKEND_NAME;
#[cfg(feature = "vpu_backend")]
use nnhal_driver::backends::VPU_BACKEND as BACKEND_NAME;

pub const MAX_PREPARED_MODELS: usize = 8;

/// Return codes from the service.
#[repr(usize)]
#[derive(Debug, Default, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
pub enum NnhalServiceError {
    Success = 0,
    DeserializeFailed,
    SerializeFailed,
    NoSlotsLeft,
    NoSuchPreparedModel,
    #[default]
    UnknownError,
}
impl From<NnhalServiceError> for Result<(), NnhalServiceError> {
    fn from(err: NnhalServiceError) -> Result<(), NnhalServiceError> {
        if err == NnhalServiceError::Success {
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Fixed-size table of prepared models handed out by PrepareModel.
struct PreparedModelSlots {
    slots: [Option<Box<dyn PreparedModel>>; MAX_PREPARED_MODELS],
}
impl PreparedModelSlots {
    const EMPTY: Option<Box<dyn PreparedModel>> = None;

    const fn new() -> Self {
        Self {
            slots: [Self::EMPTY; MAX_PREPARED_MODELS],
        }
    }

    // Returns NoSlotsLeft when full; |prepared_model| is then dropped.
    fn alloc(
        &mut self,
        prepared_model: Box<dyn PreparedModel>,
    ) -> Result<PreparedModelId, NnhalServiceError> {
        let slot = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(NnhalServiceError::NoSlotsLeft)?;
        self.slots[slot] = Some(prepared_model);
        Ok(slot as PreparedModelId)
    }

    fn release(&mut self, id: PreparedModelId) -> Result<Box<dyn PreparedModel>, NnhalServiceError> {
        self.slots
            .get_mut(id as usize)
            .and_then(|slot| slot.take())
            .ok_or(NnhalServiceError::NoSuchPreparedModel)
    }

    fn in_use(&self) -> usize { self.slots.iter().filter(|slot| slot.is_some()).count() }
}

/// A driver plus the prepared models it has handed out.
pub struct NnhalService {
    driver: Driver,
    prepared_models: Mutex<PreparedModelSlots>,
}
impl NnhalService {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            prepared_models: Mutex::new(PreparedModelSlots::new()),
        }
    }

    pub fn driver(&self) -> &Driver { &self.driver }

    pub fn prepared_models_in_use(&self) -> usize { self.prepared_models.lock().in_use() }

    /// Decodes |request_buffer|, runs the request and encodes the response
    /// into |reply_buffer|. Returns the length of the reply.
    pub fn dispatch(
        &self,
        request_buffer: &[u8],
        reply_buffer: &mut [u8],
    ) -> Result<usize, NnhalServiceError> {
        let request = postcard::from_bytes::<NnhalRequest>(request_buffer)
            .or(Err(NnhalServiceError::DeserializeFailed))?;
        trace!("dispatch {:?}", request);

        match request {
            NnhalRequest::GetStatus => self.get_status_request(reply_buffer),
            NnhalRequest::GetCapabilities => self.get_capabilities_request(false, reply_buffer),
            NnhalRequest::GetLegacyCapabilities => {
                self.get_capabilities_request(true, reply_buffer)
            }
            NnhalRequest::GetSupportedOperations(model) => {
                self.get_supported_operations_request(&model, reply_buffer)
            }
            NnhalRequest::PrepareModel { model, preference } => {
                self.prepare_model_request(&model, preference, reply_buffer)
            }
            NnhalRequest::ReleasePreparedModel(id) => self.release_prepared_model_request(id),
        }
    }

    fn get_status_request(&self, reply_buffer: &mut [u8]) -> Result<usize, NnhalServiceError> {
        reply(
            &GetStatusResponse {
                status: self.driver.get_status(),
            },
            reply_buffer,
        )
    }

    fn get_capabilities_request(
        &self,
        legacy: bool,
        reply_buffer: &mut [u8],
    ) -> Result<usize, NnhalServiceError> {
        let (status, capabilities) = if legacy {
            self.driver.get_capabilities_1_0()
        } else {
            self.driver.get_capabilities()
        };
        reply(&GetCapabilitiesResponse { status, capabilities }, reply_buffer)
    }

    fn get_supported_operations_request(
        &self,
        model: &Model,
        reply_buffer: &mut [u8],
    ) -> Result<usize, NnhalServiceError> {
        let (status, supported) = self.driver.get_supported_operations(model);
        reply(&GetSupportedOperationsResponse { status, supported }, reply_buffer)
    }

    fn prepare_model_request(
        &self,
        model: &Model,
        preference: i32,
        reply_buffer: &mut [u8],
    ) -> Result<usize, NnhalServiceError> {
        let callback = Arc::new(OneshotCallback::new());
        let outcome = self.driver.prepare(
            model,
            preference,
            Some(callback.clone() as Arc<dyn PreparedModelCallback>),
        );
        // The reply carries both channels even when the handle cannot be kept.
        let prepared_model = match callback.take_prepared_model() {
            Some(prepared_model) => match self.prepared_models.lock().alloc(prepared_model) {
                Ok(id) => {
                    info!("prepared model {} on {}", id, self.driver.name());
                    Some(id)
                }
                Err(e) => {
                    error!("prepare_model: {:?}, prepared model dropped", e);
                    None
                }
            },
            None => None,
        };
        reply(
            &PrepareModelResponse {
                status: outcome.status,
                notification: callback.status(),
                prepared_model,
            },
            reply_buffer,
        )
    }

    fn release_prepared_model_request(
        &self,
        id: PreparedModelId,
    ) -> Result<usize, NnhalServiceError> {
        let prepared_model = self.prepared_models.lock().release(id)?;
        info!("released prepared model {} ({})", id, prepared_model.backend_name());
        Ok(0)
    }
}

fn reply<T: Serialize>(response: &T, reply_buffer: &mut [u8]) -> Result<usize, NnhalServiceError> {
    postcard::to_slice(response, reply_buffer)
        .map(|reply| reply.len())
        .or(Err(NnhalServiceError::SerializeFailed))
}

static NNHAL_SERVICE: Lazy<NnhalService> = Lazy::new(|| NnhalService::new(Driver::new(BACKEND_NAME)));

/// Handles one request against the process-wide service.
pub fn dispatch(request_buffer: &[u8], reply_buffer: &mut [u8]) -> Result<usize, NnhalServiceError> {
    NNHAL_SERVICE.dispatch(request_buffer, reply_buffer)
}
