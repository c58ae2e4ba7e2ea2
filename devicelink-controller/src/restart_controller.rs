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

use devicelink_error::{Code, Error, make_err};
use devicelink_service::plugin_lifecycle::{PluginFactory, PluginLifecycle};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Inputs of the restart state machine, fanned in from the plugin directory
/// watcher and the signal listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The kubelet socket was created, so every registration is gone.
    KubeletRestarted,
    WatchError(String),
    Reload,
    /// Carries the name of the signal that asked for shutdown.
    Terminate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NeedsRestart,
    Serving,
    Terminating,
}

/// Owns the single live plugin instance and rebuilds it whenever the kubelet
/// restarts or a reload is requested.
#[derive(Debug)]
pub struct RestartController<F: PluginFactory> {
    factory: F,
    plugin: Option<F::Plugin>,
    state: ControllerState,
}

impl<F: PluginFactory> RestartController<F> {
    pub const fn new(factory: F) -> Self {
        Self {
            factory,
            plugin: None,
            state: ControllerState::NeedsRestart,
        }
    }

    pub const fn state(&self) -> ControllerState {
        self.state
    }

    pub const fn plugin(&self) -> Option<&F::Plugin> {
        self.plugin.as_ref()
    }

    /// Drives the state machine until a termination event arrives or every
    /// event source is gone. Only a missing device is returned as an error.
    pub async fn run(&mut self, mut events: mpsc::Receiver<ControllerEvent>) -> Result<(), Error> {
        loop {
            self.ensure_serving().await?;

            let Some(event) = events.recv().await else {
                warn!("All event sources closed, shutting down");
                self.shutdown().await;
                return Ok(());
            };
            if self.handle_event(event).await == ControllerState::Terminating {
                return Ok(());
            }
        }
    }

    /// Replaces the current plugin with a freshly served one when a restart is
    /// pending. A failed serve leaves the restart pending until the next event.
    pub async fn ensure_serving(&mut self) -> Result<(), Error> {
        if self.state != ControllerState::NeedsRestart {
            return Ok(());
        }
        if let Some(mut previous) = self.plugin.take() {
            if let Err(err) = previous.stop().await {
                warn!(?err, "Failed to stop previous device plugin");
            }
        }

        let device_path = self.factory.device_path();
        if !self.factory.resource_available() {
            error!(device_path, "Device not found on this host");
            return Err(make_err!(
                Code::FailedPrecondition,
                "Device {device_path} does not exist, cannot advertise it"
            ));
        }

        let mut plugin = self.factory.create();
        match plugin.serve().await {
            Ok(()) => {
                info!(device_path, "Device plugin is serving");
                self.state = ControllerState::Serving;
            }
            Err(err) => {
                warn!(
                    ?err,
                    device_path,
                    "Could not serve device plugin, waiting for the next kubelet restart"
                );
            }
        }
        self.plugin = Some(plugin);
        Ok(())
    }

    pub async fn handle_event(&mut self, event: ControllerEvent) -> ControllerState {
        match event {
            ControllerEvent::KubeletRestarted => {
                info!("Kubelet socket created, restarting device plugin");
                self.state = ControllerState::NeedsRestart;
            }
            ControllerEvent::WatchError(err) => {
                error!(%err, "Plugin directory watch failed");
            }
            ControllerEvent::Reload => {
                info!("Reload requested, restarting device plugin");
                self.state = ControllerState::NeedsRestart;
            }
            ControllerEvent::Terminate(signal) => {
                info!(signal = %signal, "Received termination signal, shutting down");
                self.shutdown().await;
            }
        }
        self.state
    }

    async fn shutdown(&mut self) {
        if let Some(plugin) = self.plugin.as_mut() {
            if let Err(err) = plugin.stop().await {
                warn!(?err, "Failed to stop device plugin during shutdown");
            }
        }
        self.plugin = None;
        self.state = ControllerState::Terminating;
    }
}
