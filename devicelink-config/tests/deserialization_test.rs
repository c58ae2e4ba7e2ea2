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

use core::time::Duration;
use std::path::PathBuf;

use devicelink_config::device_plugin::{
    AVAILABLE_DEVICES_DEFAULT, DevicePluginConfig, parse_device_count, resource_name_for,
    socket_file_name_for,
};
use pretty_assertions::assert_eq;

#[test]
fn empty_object_uses_defaults() {
    let config: DevicePluginConfig = serde_json5::from_str("{}").unwrap();
    assert_eq!(config, DevicePluginConfig::default());
    assert_eq!(
        config.kubelet_socket_path(),
        PathBuf::from("/var/lib/kubelet/device-plugins/kubelet.sock")
    );
    assert_eq!(config.start_timeout(), Duration::from_secs(60));
    assert_eq!(config.register_timeout(), Duration::from_secs(5));
}

#[test]
fn json5_overrides_fields() {
    let config: DevicePluginConfig = serde_json5::from_str(
        r#"{
            // comments are allowed
            device_plugin_dir: "/tmp/plugins/",
            kubelet_socket_name: "k.sock",
            start_timeout_secs: 3,
            register_timeout_secs: "2",
            stop_grace_period_millis: 10,
        }"#,
    )
    .unwrap();
    assert_eq!(config.kubelet_socket_path(), PathBuf::from("/tmp/plugins/k.sock"));
    assert_eq!(config.start_timeout(), Duration::from_secs(3));
    assert_eq!(config.register_timeout(), Duration::from_secs(2));
    assert_eq!(config.stop_grace_period(), Duration::from_millis(10));
}

#[test]
fn shellexpand_defaults_are_applied() {
    let config: DevicePluginConfig = serde_json5::from_str(
        r#"{
            device_plugin_dir: "${DEVICELINK_TEST_UNSET_DIR:-/srv/plugins/}",
            start_timeout_secs: "${DEVICELINK_TEST_UNSET_TIMEOUT:-7}",
        }"#,
    )
    .unwrap();
    assert_eq!(config.device_plugin_dir, "/srv/plugins/");
    assert_eq!(config.start_timeout_secs, 7);
}

#[test]
fn unknown_fields_are_rejected() {
    let result = serde_json5::from_str::<DevicePluginConfig>(r#"{ devices: 5 }"#);
    assert!(result.is_err(), "Expected error, got {result:?}");
}

#[test]
fn device_count_parsing() {
    assert_eq!(parse_device_count(Some("10")), 10);
    assert_eq!(parse_device_count(Some("+4")), 4);
    assert_eq!(parse_device_count(Some("0")), 0);
    assert_eq!(parse_device_count(Some(" 3 ")), AVAILABLE_DEVICES_DEFAULT);
    assert_eq!(parse_device_count(Some("3\n")), AVAILABLE_DEVICES_DEFAULT);
    assert_eq!(parse_device_count(Some("1.5")), AVAILABLE_DEVICES_DEFAULT);
    assert_eq!(parse_device_count(Some("abc")), AVAILABLE_DEVICES_DEFAULT);
    assert_eq!(parse_device_count(Some("")), AVAILABLE_DEVICES_DEFAULT);
    assert_eq!(parse_device_count(None), AVAILABLE_DEVICES_DEFAULT);
}

#[test]
fn negative_device_count_advertises_nothing() {
    assert_eq!(parse_device_count(Some("-1")), 0);
    assert_eq!(parse_device_count(Some("-1000")), 0);
}

#[test]
fn resource_and_socket_names() {
    assert_eq!(resource_name_for("kvm"), "devices.kubevirt.io/kvm");
    assert_eq!(socket_file_name_for("kvm"), "devices.kubevirt.io_kvm");
}
