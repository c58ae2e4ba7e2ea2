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
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devicelink_config::device_plugin::{
    DevicePluginConfig, resource_name_for, socket_file_name_for,
};
use devicelink_error::{Error, ResultExt};
use devicelink_proto::v1beta1::RegisterRequest;
use devicelink_proto::v1beta1::registration_client::RegistrationClient;
use devicelink_util::fs_util::{base_name, remove_socket_file};
use devicelink_util::plugin_api::API_VERSION;
use devicelink_util::spawn;
use devicelink_util::task::JoinHandleDropGuard;
use devicelink_util::unix_channel::dial_unix_socket;
use tokio::net::UnixListener;
use tokio::time::timeout;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, error, info, warn};

use crate::device_plugin_server::DevicePluginService;
use crate::device_pool::DevicePool;

/// A bound and accepting gRPC server together with its stop signal.
#[derive(Debug)]
struct RunningServer {
    stop: CancellationToken,
    server: JoinHandleDropGuard<Result<(), Error>>,
}

/// One advertisement of a host device to the kubelet.
///
/// The instance owns its socket file: `start` creates it, `stop` removes it.
/// At most one gRPC server is bound per instance at any time.
#[derive(Debug)]
pub struct DevicePluginInstance {
    device_path: String,
    resource_name: String,
    socket_path: PathBuf,
    kubelet_socket_path: PathBuf,
    pool: Arc<DevicePool>,
    start_timeout: Duration,
    register_timeout: Duration,
    stop_grace_period: Duration,
    running: Option<RunningServer>,
}

impl DevicePluginInstance {
    pub fn new(device_path: &str, device_count: usize, config: &DevicePluginConfig) -> Self {
        let device_name = base_name(Path::new(device_path));
        let pool = DevicePool::new(device_count);
        info!(
            device_path,
            devices = pool.len(),
            "Creating device plugin"
        );
        Self {
            device_path: device_path.to_string(),
            resource_name: resource_name_for(&device_name),
            socket_path: config
                .device_plugin_dir()
                .join(socket_file_name_for(&device_name)),
            kubelet_socket_path: config.kubelet_socket_path(),
            pool: Arc::new(pool),
            start_timeout: config.start_timeout(),
            register_timeout: config.register_timeout(),
            stop_grace_period: config.stop_grace_period(),
            running: None,
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn pool(&self) -> &DevicePool {
        &self.pool
    }

    pub const fn is_serving(&self) -> bool {
        self.running.is_some()
    }

    /// Binds the plugin socket, starts answering RPCs in the background and
    /// waits until the kubelet socket accepts a connection.
    pub async fn start(&mut self) -> Result<(), Error> {
        info!(device_path = %self.device_path, "Starting device plugin gRPC server");
        if self.running.is_some() {
            // Only one listener may ever own the socket path.
            self.stop()
                .await
                .err_tip(|| "While stopping the previous server in start()")?;
        }

        remove_socket_file(&self.socket_path)
            .await
            .err_tip(|| "Failed to set up device plugin gRPC server")?;
        let listener = UnixListener::bind(&self.socket_path).err_tip(|| {
            format!(
                "Failed to bind device plugin socket {}",
                self.socket_path.display()
            )
        })?;

        let stop = CancellationToken::new();
        let service =
            DevicePluginService::new(self.pool.clone(), self.device_path.clone(), stop.clone());
        let shutdown = stop.clone().cancelled_owned();
        let server = spawn!(
            "device_plugin_server",
            async move {
                Server::builder()
                    .add_service(service.into_service())
                    .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                    .await
                    .map_err(Error::from)
            },
            socket = %self.socket_path.display()
        );
        self.running = Some(RunningServer { stop, server });
        info!(socket = %self.socket_path.display(), "Serving device plugin gRPC requests");

        // The probe connection is dropped right away.
        if let Err(err) = dial_unix_socket(&self.kubelet_socket_path, self.start_timeout).await {
            if let Err(stop_err) = self.stop().await {
                warn!(?stop_err, "Failed to tear down server after failed start");
            }
            return Err(err).err_tip(|| "Failed to set up device plugin gRPC server");
        }
        Ok(())
    }

    /// Announces the plugin socket and resource name to the kubelet.
    pub async fn register(&self) -> Result<(), Error> {
        let channel = dial_unix_socket(&self.kubelet_socket_path, self.register_timeout)
            .await
            .err_tip(|| "While connecting to kubelet for registration")?;
        let request = RegisterRequest {
            version: API_VERSION.to_string(),
            endpoint: base_name(&self.socket_path),
            resource_name: self.resource_name.clone(),
            options: None,
        };
        info!(
            endpoint = %request.endpoint,
            resource_name = %request.resource_name,
            "Registering device plugin with kubelet"
        );
        RegistrationClient::new(channel)
            .register(request)
            .await
            .err_tip(|| "Kubelet rejected device plugin registration")?;
        Ok(())
    }

    /// Starts the server and registers it. A failed registration stops the
    /// server again before the error is returned.
    pub async fn serve(&mut self) -> Result<(), Error> {
        self.start().await?;
        if let Err(err) = self.register().await {
            error!(
                ?err,
                "Could not register device plugin. Make sure that the DevicePlugins feature gate is enabled and Kubelet is running"
            );
            if let Err(stop_err) = self.stop().await {
                warn!(?stop_err, "Failed to stop device plugin after failed registration");
            }
            return Err(err);
        }
        info!(resource_name = %self.resource_name, "Registered device plugin with kubelet");
        Ok(())
    }

    /// Stops the gRPC server and removes the socket file. Stopping a plugin
    /// that is not serving succeeds without doing anything.
    pub async fn stop(&mut self) -> Result<(), Error> {
        let Some(RunningServer { stop, mut server }) = self.running.take() else {
            info!(device_path = %self.device_path, "Tried to stop stopped device plugin");
            return Ok(());
        };
        info!(device_path = %self.device_path, "Stopping device plugin gRPC server");
        stop.cancel();

        match timeout(self.stop_grace_period, &mut server).await {
            Ok(Ok(Ok(()))) => debug!("Device plugin gRPC server drained"),
            Ok(Ok(Err(err))) => warn!(?err, "Device plugin gRPC server exited with error"),
            Ok(Err(err)) => warn!(?err, "Device plugin gRPC server task failed"),
            Err(_) => {
                warn!(
                    grace_period = ?self.stop_grace_period,
                    "Device plugin gRPC server did not drain in time, aborting"
                );
                server.abort();
            }
        }

        info!(socket = %self.socket_path.display(), "Removing device plugin socket");
        remove_socket_file(&self.socket_path)
            .await
            .err_tip(|| "While stopping device plugin")?;
        Ok(())
    }
}
