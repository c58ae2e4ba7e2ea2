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

use core::fmt::Debug;
use core::future::Future;
use std::path::Path;

use devicelink_config::device_plugin::DevicePluginConfig;
use devicelink_error::Error;

use crate::device_plugin::DevicePluginInstance;

/// The part of a plugin instance the restart controller drives.
pub trait PluginLifecycle: Debug + Send + Sized {
    /// Starts serving and registers with the kubelet.
    fn serve(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Stops serving. Must succeed as a no-op when not serving.
    fn stop(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Creates fresh plugin instances for each (re)start.
pub trait PluginFactory: Debug + Send + Sync {
    type Plugin: PluginLifecycle;

    /// Host path of the advertised device.
    fn device_path(&self) -> &str;

    /// Whether the advertised device exists on the host right now.
    fn resource_available(&self) -> bool;

    fn create(&self) -> Self::Plugin;
}

impl PluginLifecycle for DevicePluginInstance {
    async fn serve(&mut self) -> Result<(), Error> {
        Self::serve(self).await
    }

    async fn stop(&mut self) -> Result<(), Error> {
        Self::stop(self).await
    }
}

/// Builds [`DevicePluginInstance`]s for one host device.
#[derive(Debug, Clone)]
pub struct DevicePluginFactory {
    device_path: String,
    device_count: usize,
    config: DevicePluginConfig,
}

impl DevicePluginFactory {
    pub fn new(device_path: &str, device_count: usize, config: DevicePluginConfig) -> Self {
        Self {
            device_path: device_path.to_string(),
            device_count,
            config,
        }
    }
}

impl PluginFactory for DevicePluginFactory {
    type Plugin = DevicePluginInstance;

    fn device_path(&self) -> &str {
        &self.device_path
    }

    fn resource_available(&self) -> bool {
        Path::new(&self.device_path).exists()
    }

    fn create(&self) -> DevicePluginInstance {
        DevicePluginInstance::new(&self.device_path, self.device_count, &self.config)
    }
}
