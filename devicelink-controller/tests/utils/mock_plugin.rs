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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use devicelink_error::{Code, Error, make_err};
use devicelink_service::plugin_lifecycle::{PluginFactory, PluginLifecycle};
use tokio::sync::mpsc;

pub const MOCK_DEVICE_PATH: &str = "/dev/mock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginCall {
    Create(usize),
    Serve(usize),
    Stop(usize),
}

/// Switches shared between a test and the factory it handed to the controller.
#[derive(Debug, Default)]
pub struct MockSwitches {
    pub device_missing: AtomicBool,
    pub fail_serve: AtomicBool,
    pub fail_stop: AtomicBool,
}

impl MockSwitches {
    pub fn set_device_missing(&self, value: bool) {
        self.device_missing.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_serve(&self, value: bool) {
        self.fail_serve.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, value: bool) {
        self.fail_stop.store(value, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MockPlugin {
    id: usize,
    switches: Arc<MockSwitches>,
    tx_call: mpsc::UnboundedSender<PluginCall>,
}

impl PluginLifecycle for MockPlugin {
    async fn serve(&mut self) -> Result<(), Error> {
        let _ = self.tx_call.send(PluginCall::Serve(self.id));
        if self.switches.fail_serve.load(Ordering::SeqCst) {
            return Err(make_err!(Code::Unavailable, "Kubelet is not listening"));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Error> {
        let _ = self.tx_call.send(PluginCall::Stop(self.id));
        if self.switches.fail_stop.load(Ordering::SeqCst) {
            return Err(make_err!(Code::Internal, "Could not remove socket"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockPluginFactory {
    next_id: AtomicUsize,
    switches: Arc<MockSwitches>,
    tx_call: mpsc::UnboundedSender<PluginCall>,
}

impl MockPluginFactory {
    pub fn new() -> (
        Self,
        Arc<MockSwitches>,
        mpsc::UnboundedReceiver<PluginCall>,
    ) {
        let (tx_call, rx_call) = mpsc::unbounded_channel();
        let switches = Arc::new(MockSwitches::default());
        let factory = Self {
            next_id: AtomicUsize::new(0),
            switches: switches.clone(),
            tx_call,
        };
        (factory, switches, rx_call)
    }
}

impl PluginFactory for MockPluginFactory {
    type Plugin = MockPlugin;

    fn device_path(&self) -> &str {
        MOCK_DEVICE_PATH
    }

    fn resource_available(&self) -> bool {
        !self.switches.device_missing.load(Ordering::SeqCst)
    }

    fn create(&self) -> MockPlugin {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx_call.send(PluginCall::Create(id));
        MockPlugin {
            id,
            switches: self.switches.clone(),
            tx_call: self.tx_call.clone(),
        }
    }
}

/// Drains every call recorded so far.
pub fn recorded_calls(rx_call: &mut mpsc::UnboundedReceiver<PluginCall>) -> Vec<PluginCall> {
    let mut calls = Vec::new();
    while let Ok(call) = rx_call.try_recv() {
        calls.push(call);
    }
    calls
}
