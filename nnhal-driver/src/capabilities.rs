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

// Advertised performance of the stock backends.

use log::warn;
use nnhal_interface::{Capabilities, PerformanceInfo};

use crate::backends::{CPU_BACKEND, VPU_BACKEND};

pub const CPU_CAPABILITIES: Capabilities = Capabilities {
    float32_performance: PerformanceInfo::new(0.9, 0.9),
    quantized8_performance: PerformanceInfo::new(0.9, 0.9),
    relaxed_float32_to_float16_performance: PerformanceInfo::new(0.9, 0.9),
};

// Relaxed computation is not advertised.
pub const VPU_CAPABILITIES: Capabilities = Capabilities {
    float32_performance: PerformanceInfo::new(1.1, 1.1),
    quantized8_performance: PerformanceInfo::new(1.1, 1.1),
    relaxed_float32_to_float16_performance: PerformanceInfo::new(0.0, 0.0),
};

/// Returns the capability record for backend |name|. Anything that is not
/// the CPU is taken to be the accelerator.
pub fn capabilities_for(name: &str) -> Capabilities {
    match name {
        CPU_BACKEND => CPU_CAPABILITIES,
        VPU_BACKEND => VPU_CAPABILITIES,
        _ => {
            warn!("no capabilities for {}, using accelerator record", name);
            VPU_CAPABILITIES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_capabilities() {
        let caps = capabilities_for(CPU_BACKEND);
        assert_eq!(caps.float32_performance, PerformanceInfo::new(0.9, 0.9));
        assert_eq!(caps.quantized8_performance, PerformanceInfo::new(0.9, 0.9));
        assert_eq!(caps.relaxed_float32_to_float16_performance, PerformanceInfo::new(0.9, 0.9));
    }

    #[test]
    fn test_vpu_capabilities() {
        let caps = capabilities_for(VPU_BACKEND);
        assert_eq!(caps.float32_performance, PerformanceInfo::new(1.1, 1.1));
        assert_eq!(caps.quantized8_performance, PerformanceInfo::new(1.1, 1.1));
        assert_eq!(caps.relaxed_float32_to_float16_performance, PerformanceInfo::default());
    }

    #[test]
    fn test_unknown_falls_back_to_accelerator() {
        assert_eq!(capabilities_for("GPU"), VPU_CAPABILITIES);
        assert_eq!(capabilities_for(""), VPU_CAPABILITIES);
        assert_eq!(capabilities_for("cpu"), VPU_CAPABILITIES);
    }
}
