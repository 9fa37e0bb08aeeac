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

//! Backend selection.
//!
//! Backends are registered by name together with their capabilities, the
//! operations they support and a factory for their prepared models. A
//! driver configured with a name that was never registered cannot prepare
//! anything; that is a deployment fault, so lookups return None rather
//! than an error.

use alloc::boxed::Box;
use alloc::vec::Vec;
use hashbrown::HashMap;
use log::trace;
use nnhal_interface::{Capabilities, PreparedModel};
use nnhal_shared::Model;

use crate::backends;
use crate::validator::SupportTable;

/// Builds a backend's prepared model. The model is passed through
/// unmodified.
pub type PreparedModelFactory = Box<dyn Fn(&Model) -> Box<dyn PreparedModel> + Send + Sync>;

pub struct BackendDescriptor {
    pub name: &'static str,
    pub capabilities: Capabilities,
    pub support: &'static SupportTable,
    factory: PreparedModelFactory,
}
impl BackendDescriptor {
    pub fn new<F>(
        name: &'static str,
        capabilities: Capabilities,
        support: &'static SupportTable,
        factory: F,
    ) -> Self
    where
        F: Fn(&Model) -> Box<dyn PreparedModel> + Send + Sync + 'static,
    {
        Self {
            name,
            capabilities,
            support,
            factory: Box::new(factory),
        }
    }

    /// Creates an uninitialized prepared model for |model|.
    pub fn create(&self, model: &Model) -> Box<dyn PreparedModel> { (self.factory)(model) }
}

pub struct BackendRegistry {
    backends: HashMap<&'static str, BackendDescriptor>,
}
impl BackendRegistry {
    /// Returns an empty registry; see default() for the stock backends.
    pub fn new() -> Self {
        BackendRegistry {
            backends: HashMap::new(),
        }
    }

    /// Adds |descriptor|, returning any backend previously registered
    /// under the same name.
    pub fn register(&mut self, descriptor: BackendDescriptor) -> Option<BackendDescriptor> {
        trace!("register backend {}", descriptor.name);
        self.backends.insert(descriptor.name, descriptor)
    }

    pub fn lookup(&self, name: &str) -> Option<&BackendDescriptor> { self.backends.get(name) }

    /// Creates a prepared model for |model| on backend |name|, or None if
    /// no such backend is registered.
    pub fn select(&self, name: &str, model: &Model) -> Option<Box<dyn PreparedModel>> {
        let descriptor = self.lookup(name)?;
        trace!("select {} for {}", descriptor.name, model);
        Some(descriptor.create(model))
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.backends.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = BackendRegistry::new();
        registry.register(backends::cpu::descriptor());
        registry.register(backends::vpu::descriptor());
        registry
    }
}
