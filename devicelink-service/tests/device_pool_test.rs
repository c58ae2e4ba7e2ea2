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
use devicelink_service::device_pool::{DeviceHealth, DevicePool, build_pool};
use pretty_assertions::assert_eq;

#[test]
fn build_pool_yields_sequential_healthy_devices() {
    for count in [0, 1, 3, 1000] {
        let devices = build_pool(count);
        assert_eq!(devices.len(), count);
        let ids: HashSet<&str> = devices.iter().map(|device| device.id.as_str()).collect();
        assert_eq!(ids.len(), count, "ids must be unique");
        for (i, device) in devices.iter().enumerate() {
            assert_eq!(device.id, i.to_string());
            assert_eq!(device.health, DeviceHealth::Healthy);
        }
    }
}

#[test]
fn pool_lookup_only_knows_built_ids() {
    let pool = DevicePool::new(3);
    assert_eq!(pool.len(), 3);
    assert!(pool.contains("0"));
    assert!(pool.contains("2"));
    assert!(!pool.contains("3"));
    assert!(!pool.contains("-1"));
    assert!(!pool.contains(""));
}

#[test]
fn empty_pool() {
    let pool = DevicePool::new(0);
    assert!(pool.is_empty());
    assert!(pool.list_and_watch_response().devices.is_empty());
}

#[test]
fn wire_snapshot_uses_kubelet_health_strings() {
    let pool = DevicePool::new(2);
    assert_eq!(
        pool.list_and_watch_response(),
        v1beta1::ListAndWatchResponse {
            devices: vec![
                v1beta1::Device {
                    id: "0".to_string(),
                    health: "Healthy".to_string(),
                    topology: None,
                },
                v1beta1::Device {
                    id: "1".to_string(),
                    health: "Healthy".to_string(),
                    topology: None,
                },
            ],
        }
    );
    assert_eq!(DeviceHealth::Unhealthy.as_str(), "Unhealthy");
}
