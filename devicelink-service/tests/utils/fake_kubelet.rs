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

use std::path::{Path, PathBuf};

use devicelink_config::device_plugin::DevicePluginConfig;
use devicelink_error::{Error, ResultExt};
use devicelink_proto::v1beta1::registration_server::{Registration, RegistrationServer};
use devicelink_proto::v1beta1::{Empty, RegisterRequest};
use devicelink_util::spawn;
use devicelink_util::task::JoinHandleDropGuard;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub const KUBELET_SOCKET_NAME: &str = "kubelet.sock";

struct RecordingRegistration {
    tx_register: mpsc::UnboundedSender<RegisterRequest>,
    reject: bool,
}

#[tonic::async_trait]
impl Registration for RecordingRegistration {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let request = request.into_inner();
        let _ = self.tx_register.send(request);
        if self.reject {
            return Err(Status::invalid_argument("Registration rejected by test"));
        }
        Ok(Response::new(Empty {}))
    }
}

/// Registration endpoint listening on `kubelet.sock` inside a temp dir.
pub struct FakeKubelet {
    pub rx_register: mpsc::UnboundedReceiver<RegisterRequest>,
    stop: CancellationToken,
    _server: JoinHandleDropGuard<()>,
}

impl FakeKubelet {
    pub fn start(dir: &Path, reject: bool) -> Result<Self, Error> {
        let (tx_register, rx_register) = mpsc::unbounded_channel();
        let listener = UnixListener::bind(dir.join(KUBELET_SOCKET_NAME))
            .err_tip(|| "Binding fake kubelet socket")?;
        let stop = CancellationToken::new();
        let shutdown = stop.clone().cancelled_owned();
        let service = RegistrationServer::new(RecordingRegistration {
            tx_register,
            reject,
        });
        let server = spawn!("fake_kubelet", async move {
            let _ = Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                .await;
        });
        Ok(Self {
            rx_register,
            stop,
            _server: server,
        })
    }
}

impl Drop for FakeKubelet {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Config pointing all sockets into `dir` with short timeouts.
pub fn test_config(dir: &Path) -> DevicePluginConfig {
    DevicePluginConfig {
        device_plugin_dir: dir.display().to_string(),
        kubelet_socket_name: KUBELET_SOCKET_NAME.to_string(),
        start_timeout_secs: 2,
        register_timeout_secs: 1,
        stop_grace_period_millis: 200,
    }
}

pub fn plugin_dir() -> Result<(TempDir, PathBuf), Error> {
    let dir = tempfile::tempdir().err_tip(|| "Creating temp plugin dir")?;
    let path = dir.path().to_path_buf();
    Ok((dir, path))
}
