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

// Model preparation: select a backend, validate the model, initialize the
// backend's prepared model and report through the callback.
//
// A call has two result channels. The returned ErrorStatus is the
// synchronous answer; the callback carries the detailed outcome and, on
// success, the prepared model. Past the argument check the callback is
// notified exactly once, except when no backend matches (the caller only
// gets the synchronous InvalidArgument).

use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{error, info, trace};
use nnhal_interface::{ErrorStatus, ExecutionPreference, InitializeError};
use nnhal_interface::{PreparedModel, PreparedModelCallback};
use nnhal_shared::Model;

use crate::selector::BackendRegistry;
use crate::validator::{valid_model, ValidationOutcome};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrepareState {
    Start,
    Selecting,
    Validating,
    Initializing,
    NotifiedSuccess,
    NotifiedFailure,
    Rejected, // returned without notifying
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PrepareOutcome {
    pub status: ErrorStatus,
    pub notified: Option<ErrorStatus>,
    pub state: PrepareState,
}

// Wraps the callback so it can be used at most once.
struct Notifier(Arc<dyn PreparedModelCallback>);
impl Notifier {
    fn notify(self, status: ErrorStatus, prepared_model: Option<Box<dyn PreparedModel>>) -> ErrorStatus {
        self.0.notify(status, prepared_model);
        status
    }
}

pub struct PrepareModelTask<'a> {
    registry: &'a BackendRegistry,
    backend_name: &'a str,
    model: &'a Model,
    state: PrepareState,
}
impl<'a> PrepareModelTask<'a> {
    pub fn new(registry: &'a BackendRegistry, backend_name: &'a str, model: &'a Model) -> Self {
        Self {
            registry,
            backend_name,
            model,
            state: PrepareState::Start,
        }
    }

    pub fn state(&self) -> PrepareState { self.state }

    fn transition(&mut self, next: PrepareState) {
        trace!("prepare {}: {:?} -> {:?}", self.backend_name, self.state, next);
        self.state = next;
    }

    fn finish(&mut self, status: ErrorStatus, notified: Option<ErrorStatus>) -> PrepareOutcome {
        self.transition(match notified {
            Some(ErrorStatus::None) => PrepareState::NotifiedSuccess,
            Some(_) => PrepareState::NotifiedFailure,
            None => PrepareState::Rejected,
        });
        PrepareOutcome {
            status,
            notified,
            state: self.state,
        }
    }

    /// Runs the preparation to completion. |preference| is the raw wire
    /// value; the callback, when present, is notified at most once.
    pub fn run(
        mut self,
        preference: i32,
        callback: Option<Arc<dyn PreparedModelCallback>>,
    ) -> PrepareOutcome {
        let notifier = match callback {
            Some(callback) => Notifier(callback),
            None => {
                error!("prepare {}: no callback", self.backend_name);
                return self.finish(ErrorStatus::InvalidArgument, None);
            }
        };
        if ExecutionPreference::from_raw(preference).is_none() {
            error!("prepare {}: invalid preference {}", self.backend_name, preference);
            let notified = notifier.notify(ErrorStatus::InvalidArgument, None);
            return self.finish(ErrorStatus::InvalidArgument, Some(notified));
        }

        self.transition(PrepareState::Selecting);
        let mut prepared_model = match self.registry.select(self.backend_name, self.model) {
            Some(prepared_model) => prepared_model,
            None => {
                error!("prepare: no backend {}", self.backend_name);
                return self.finish(ErrorStatus::InvalidArgument, None);
            }
        };

        self.transition(PrepareState::Validating);
        // NB: select() succeeded so the backend is registered.
        let outcome = match self.registry.lookup(self.backend_name) {
            Some(descriptor) => valid_model(self.model, descriptor.support),
            None => ValidationOutcome::unsupported(),
        };
        if !outcome.valid {
            if outcome.corruption_detected {
                error!("prepare {}: model is corrupt", self.backend_name);
            } else {
                error!("prepare {}: model not supported", self.backend_name);
            }
            let notified = notifier.notify(ErrorStatus::InvalidArgument, None);
            return self.finish(ErrorStatus::InvalidArgument, Some(notified));
        }

        self.transition(PrepareState::Initializing);
        match prepared_model.initialize() {
            Ok(()) => {
                info!("prepare {}: model ready", self.backend_name);
                let notified = notifier.notify(ErrorStatus::None, Some(prepared_model));
                self.finish(ErrorStatus::None, Some(notified))
            }
            Err(InitializeError::ModelCorrupted) => {
                error!("prepare {}: model corrupted during initialization", self.backend_name);
                let notified = notifier.notify(ErrorStatus::InvalidArgument, None);
                self.finish(ErrorStatus::InvalidArgument, Some(notified))
            }
            Err(InitializeError::BackendFailure) => {
                error!("prepare {}: initialization failed", self.backend_name);
                let notified = notifier.notify(ErrorStatus::GeneralFailure, None);
                self.finish(ErrorStatus::None, Some(notified))
            }
        }
    }
}
