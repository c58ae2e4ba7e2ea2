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

use core::pin::Pin;
use std::sync::Arc;

use devicelink_error::{Error, error_if};
use devicelink_proto::v1beta1::device_plugin_server::{
    DevicePlugin, DevicePluginServer as Server,
};
use devicelink_proto::v1beta1::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse, DevicePluginOptions, DeviceSpec,
    Empty, ListAndWatchResponse, PreStartContainerRequest, PreStartContainerResponse,
    PreferredAllocationRequest, PreferredAllocationResponse,
};
use futures::stream::{Stream, unfold};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{Level, debug, info, instrument};

use crate::device_pool::DevicePool;

const DEVICE_PERMISSIONS: &str = "rw";

pub type ListAndWatchStream =
    Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send + 'static>>;

/// Handlers for the kubelet's calls against one advertised resource.
#[derive(Debug, Clone)]
pub struct DevicePluginService {
    pool: Arc<DevicePool>,
    device_path: String,
    stop: CancellationToken,
}

impl DevicePluginService {
    pub const fn new(pool: Arc<DevicePool>, device_path: String, stop: CancellationToken) -> Self {
        Self {
            pool,
            device_path,
            stop,
        }
    }

    pub fn into_service(self) -> Server<Self> {
        Server::new(self)
    }

    fn device_spec(&self) -> DeviceSpec {
        DeviceSpec {
            container_path: self.device_path.clone(),
            host_path: self.device_path.clone(),
            permissions: DEVICE_PERMISSIONS.to_string(),
        }
    }

    fn inner_allocate(&self, request: AllocateRequest) -> Result<AllocateResponse, Error> {
        let mut container_responses = Vec::with_capacity(request.container_requests.len());
        for container_request in request.container_requests {
            debug!(devices = ?container_request.devices_ids, "Allocate request for container");
            for id in &container_request.devices_ids {
                error_if!(
                    !self.pool.contains(id),
                    "Invalid AllocateRequest, unknown device: {id}"
                );
            }
            container_responses.push(ContainerAllocateResponse {
                devices: vec![self.device_spec()],
                ..Default::default()
            });
        }
        Ok(AllocateResponse {
            container_responses,
        })
    }

    fn inner_list_and_watch(&self) -> ListAndWatchStream {
        let snapshot = self.pool.list_and_watch_response();
        info!(
            device_path = %self.device_path,
            devices = snapshot.devices.len(),
            "ListAndWatch exposing devices"
        );
        let stop = self.stop.clone();
        // Health never changes, so after the first snapshot the stream only
        // waits for the stop signal and then ends.
        Box::pin(unfold(Some(snapshot), move |pending| {
            let stop = stop.clone();
            async move {
                match pending {
                    Some(snapshot) => Some((Ok(snapshot), None)),
                    None => {
                        stop.cancelled().await;
                        None
                    }
                }
            }
        }))
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    #[instrument(ret(level = Level::DEBUG), level = Level::ERROR, skip_all)]
    async fn get_device_plugin_options(
        &self,
        _grpc_request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(DevicePluginOptions::default()))
    }

    type ListAndWatchStream = ListAndWatchStream;

    #[instrument(err, level = Level::ERROR, skip_all)]
    async fn list_and_watch(
        &self,
        _grpc_request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        Ok(Response::new(self.inner_list_and_watch()))
    }

    #[instrument(
        ret(level = Level::DEBUG),
        level = Level::ERROR,
        skip_all,
        fields(request = ?grpc_request.get_ref())
    )]
    async fn get_preferred_allocation(
        &self,
        grpc_request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        Ok(Response::new(PreferredAllocationResponse::default()))
    }

    #[instrument(
        err,
        ret(level = Level::DEBUG),
        level = Level::ERROR,
        skip_all,
        fields(request = ?grpc_request.get_ref())
    )]
    async fn allocate(
        &self,
        grpc_request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        self.inner_allocate(grpc_request.into_inner())
            .map(Response::new)
            .map_err(Into::into)
    }

    #[instrument(
        ret(level = Level::DEBUG),
        level = Level::ERROR,
        skip_all,
        fields(request = ?grpc_request.get_ref())
    )]
    async fn pre_start_container(
        &self,
        grpc_request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
