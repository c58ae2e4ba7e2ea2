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

use serde::Deserialize;

use crate::serde_utils::{convert_numeric_with_shellexpand, convert_string_with_shellexpand};

/// Host device advertised by the plugin.
pub const DEVICE_PATH: &str = "/dev/kvm";

/// Namespace prefixed to every advertised resource name.
pub const RESOURCE_NAMESPACE: &str = "devices.kubevirt.io";

/// Number of device entries advertised when nothing else is configured.
pub const AVAILABLE_DEVICES_DEFAULT: usize = 1000;

/// Environment variable overriding the number of advertised devices.
pub const AVAILABLE_DEVICES_ENV: &str = "AVAILABLE_DEVICES";

pub const DEFAULT_DEVICE_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins/";
pub const DEFAULT_KUBELET_SOCKET_NAME: &str = "kubelet.sock";

const DEFAULT_START_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REGISTER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STOP_GRACE_PERIOD_MILLIS: u64 = 500;

fn default_device_plugin_dir() -> String {
    DEFAULT_DEVICE_PLUGIN_DIR.to_string()
}

fn default_kubelet_socket_name() -> String {
    DEFAULT_KUBELET_SOCKET_NAME.to_string()
}

const fn default_start_timeout_secs() -> u64 {
    DEFAULT_START_TIMEOUT_SECS
}

const fn default_register_timeout_secs() -> u64 {
    DEFAULT_REGISTER_TIMEOUT_SECS
}

const fn default_stop_grace_period_millis() -> u64 {
    DEFAULT_STOP_GRACE_PERIOD_MILLIS
}

/// Runtime settings of the device plugin daemon.
///
/// Every field has a default matching the kubelet's conventions, so an empty
/// object (or no config file at all) yields a working daemon.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DevicePluginConfig {
    /// Directory holding the kubelet socket and the plugin sockets.
    ///
    /// Default: "/var/lib/kubelet/device-plugins/"
    #[serde(
        default = "default_device_plugin_dir",
        deserialize_with = "convert_string_with_shellexpand"
    )]
    pub device_plugin_dir: String,

    /// File name of the kubelet registration socket inside `device_plugin_dir`.
    /// Creation of this file is what signals a kubelet restart.
    ///
    /// Default: "kubelet.sock"
    #[serde(
        default = "default_kubelet_socket_name",
        deserialize_with = "convert_string_with_shellexpand"
    )]
    pub kubelet_socket_name: String,

    /// How long the start probe waits for the kubelet socket to accept a
    /// connection.
    ///
    /// Default: 60
    #[serde(
        default = "default_start_timeout_secs",
        deserialize_with = "convert_numeric_with_shellexpand"
    )]
    pub start_timeout_secs: u64,

    /// Deadline for dialing the kubelet during registration.
    ///
    /// Default: 5
    #[serde(
        default = "default_register_timeout_secs",
        deserialize_with = "convert_numeric_with_shellexpand"
    )]
    pub register_timeout_secs: u64,

    /// Time given to the gRPC server to drain after a stop request before it
    /// is aborted.
    ///
    /// Default: 500
    #[serde(
        default = "default_stop_grace_period_millis",
        deserialize_with = "convert_numeric_with_shellexpand"
    )]
    pub stop_grace_period_millis: u64,
}

impl Default for DevicePluginConfig {
    fn default() -> Self {
        Self {
            device_plugin_dir: default_device_plugin_dir(),
            kubelet_socket_name: default_kubelet_socket_name(),
            start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            register_timeout_secs: DEFAULT_REGISTER_TIMEOUT_SECS,
            stop_grace_period_millis: DEFAULT_STOP_GRACE_PERIOD_MILLIS,
        }
    }
}

impl DevicePluginConfig {
    pub fn device_plugin_dir(&self) -> PathBuf {
        PathBuf::from(&self.device_plugin_dir)
    }

    /// Full path of the kubelet registration socket.
    pub fn kubelet_socket_path(&self) -> PathBuf {
        self.device_plugin_dir().join(&self.kubelet_socket_name)
    }

    pub const fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub const fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    pub const fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_millis)
    }
}

/// Resource name the kubelet sees for a device file name, e.g. `kvm` becomes
/// `devices.kubevirt.io/kvm`.
pub fn resource_name_for(device_name: &str) -> String {
    format!("{RESOURCE_NAMESPACE}/{device_name}")
}

/// Plugin socket file name for a device file name. The kubelet forbids `/` in
/// socket names so the namespace is joined with `_`.
pub fn socket_file_name_for(device_name: &str) -> String {
    format!("{RESOURCE_NAMESPACE}_{device_name}")
}

/// Parses a device count. Missing and unparseable values resolve to
/// [`AVAILABLE_DEVICES_DEFAULT`]; negative counts advertise no devices.
pub fn parse_device_count(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.parse::<i64>().ok())
        .map_or(AVAILABLE_DEVICES_DEFAULT, |count| {
            usize::try_from(count).unwrap_or(0)
        })
}

/// Reads the device count from the `AVAILABLE_DEVICES` environment variable.
pub fn device_count_from_env() -> usize {
    parse_device_count(std::env::var(AVAILABLE_DEVICES_ENV).ok().as_deref())
}
