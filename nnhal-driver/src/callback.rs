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

//! A PreparedModelCallback that records the first notification.
//!
//! Callers that prepare synchronously (like the service component) hand
//! one of these to prepare_model and inspect it after the call returns.

use alloc::boxed::Box;
use log::error;
use nnhal_interface::{ErrorStatus, PreparedModel, PreparedModelCallback};
use spin::Mutex;

struct Inner {
    status: Option<ErrorStatus>,
    prepared_model: Option<Box<dyn PreparedModel>>,
    notify_count: usize,
}

pub struct OneshotCallback {
    inner: Mutex<Inner>,
}
impl OneshotCallback {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: None,
                prepared_model: None,
                notify_count: 0,
            }),
        }
    }

    /// Status of the first notification, if any.
    pub fn status(&self) -> Option<ErrorStatus> { self.inner.lock().status }

    pub fn is_notified(&self) -> bool { self.status().is_some() }

    pub fn notify_count(&self) -> usize { self.inner.lock().notify_count }

    /// Takes ownership of the prepared model delivered on success.
    pub fn take_prepared_model(&self) -> Option<Box<dyn PreparedModel>> {
        self.inner.lock().prepared_model.take()
    }
}
impl Default for OneshotCallback {
    fn default() -> Self { Self::new() }
}

impl PreparedModelCallback for OneshotCallback {
    fn notify(&self, status: ErrorStatus, prepared_model: Option<Box<dyn PreparedModel>>) {
        let mut inner = self.inner.lock();
        inner.notify_count += 1;
        if let Some(first) = inner.status {
            error!(
                "duplicate notification {:?} ignored (first was {:?}, {} total)",
                status, first, inner.notify_count
            );
            return;
        }
        inner.status = Some(status);
        inner.prepared_model = prepared_model;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cpu::CpuPreparedModel;
    use crate::testing::*;

    #[test]
    fn test_new_is_empty() {
        let callback = OneshotCallback::new();
        assert!(!callback.is_notified());
        assert_eq!(callback.status(), None);
        assert_eq!(callback.notify_count(), 0);
        assert!(callback.take_prepared_model().is_none());
    }

    #[test]
    fn test_records_success() {
        let callback = OneshotCallback::default();
        callback.notify(ErrorStatus::None, Some(Box::new(CpuPreparedModel::new(&relu_model()))));
        assert_eq!(callback.status(), Some(ErrorStatus::None));
        let prepared = callback.take_prepared_model().unwrap();
        assert_eq!(prepared.model(), &relu_model());
        // Ownership moved out.
        assert!(callback.take_prepared_model().is_none());
    }

    #[test]
    fn test_duplicate_ignored() {
        let callback = OneshotCallback::new();
        callback.notify(ErrorStatus::InvalidArgument, None);
        callback.notify(ErrorStatus::None, Some(Box::new(CpuPreparedModel::new(&relu_model()))));
        assert_eq!(callback.status(), Some(ErrorStatus::InvalidArgument));
        assert_eq!(callback.notify_count(), 2);
        assert!(callback.take_prepared_model().is_none());
    }
}
