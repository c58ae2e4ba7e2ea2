// Copyright 2025 The Devicelink Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;

use devicelink_proto::v1beta1;
use devicelink_util::plugin_api::{HEALTHY, UNHEALTHY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    Healthy,
    Unhealthy,
}

impl DeviceHealth {
    /// Wire representation used by the kubelet.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => HEALTHY,
            Self::Unhealthy => UNHEALTHY,
        }
    }
}

/// One allocatable unit of the advertised resource. Ids are bookkeeping only,
/// every unit maps to the same host device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub health: DeviceHealth,
}

impl From<&Device> for v1beta1::Device {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            health: device.health.as_str().to_string(),
            topology: None,
        }
    }
}

/// Builds `count` healthy devices with ids `"0"` through `"count-1"`.
pub fn build_pool(count: usize) -> Vec<Device> {
    (0..count)
        .map(|i| Device {
            id: i.to_string(),
            health: DeviceHealth::Healthy,
        })
        .collect()
}

/// Immutable set of devices advertised by one plugin instance.
#[derive(Debug, Clone)]
pub struct DevicePool {
    devices: Vec<Device>,
    ids: HashSet<String>,
}

impl DevicePool {
    pub fn new(count: usize) -> Self {
        Self::from_devices(build_pool(count))
    }

    pub fn from_devices(devices: Vec<Device>) -> Self {
        let ids = devices.iter().map(|device| device.id.clone()).collect();
        Self { devices, ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn list_and_watch_response(&self) -> v1beta1::ListAndWatchResponse {
        v1beta1::ListAndWatchResponse {
            devices: self.devices.iter().map(v1beta1::Device::from).collect(),
        }
    }
}
