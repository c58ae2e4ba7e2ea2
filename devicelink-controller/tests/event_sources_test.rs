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

use devicelink_controller::event_sources::{classify_fs_event, classify_signal, watch_plugin_dir};
use devicelink_controller::restart_controller::ControllerEvent;
use devicelink_macro::devicelink_test;
use notify::Event;
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn kubelet_socket() -> PathBuf {
    PathBuf::from("/var/lib/kubelet/device-plugins/kubelet.sock")
}

#[test]
fn kubelet_socket_creation_is_a_restart() {
    let event = Event::new(EventKind::Create(CreateKind::File)).add_path(kubelet_socket());
    assert_eq!(
        classify_fs_event(&event, &kubelet_socket()),
        Some(ControllerEvent::KubeletRestarted)
    );

    let event = Event::new(EventKind::Create(CreateKind::Any)).add_path(kubelet_socket());
    assert_eq!(
        classify_fs_event(&event, &kubelet_socket()),
        Some(ControllerEvent::KubeletRestarted)
    );
}

#[test]
fn other_events_are_ignored() {
    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(kubelet_socket());
    assert_eq!(classify_fs_event(&removed, &kubelet_socket()), None);

    let modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(kubelet_socket());
    assert_eq!(classify_fs_event(&modified, &kubelet_socket()), None);

    let other_socket = Event::new(EventKind::Create(CreateKind::File))
        .add_path(PathBuf::from("/var/lib/kubelet/device-plugins/devices.kubevirt.io_kvm"));
    assert_eq!(classify_fs_event(&other_socket, &kubelet_socket()), None);
}

#[test]
fn hangup_reloads_everything_else_terminates() {
    assert_eq!(classify_signal("SIGHUP"), ControllerEvent::Reload);
    for name in ["SIGINT", "SIGTERM", "SIGQUIT"] {
        assert_eq!(
            classify_signal(name),
            ControllerEvent::Terminate(name.to_string())
        );
    }
}

#[devicelink_test]
async fn watcher_reports_kubelet_socket_creation() -> Result<(), Box<dyn core::error::Error>> {
    let dir = tempfile::tempdir()?;
    let kubelet_socket = dir.path().join("kubelet.sock");
    let (tx, mut rx) = mpsc::channel(16);
    let _watcher = watch_plugin_dir(dir.path(), kubelet_socket.clone(), tx)?;

    std::fs::write(dir.path().join("devices.kubevirt.io_kvm"), b"")?;
    std::fs::write(&kubelet_socket, b"")?;

    let event = timeout(Duration::from_secs(5), rx.recv()).await?;
    assert_eq!(event, Some(ControllerEvent::KubeletRestarted));
    Ok(())
}

#[devicelink_test]
async fn watching_missing_dir_fails() -> Result<(), Box<dyn core::error::Error>> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing");
    let (tx, _rx) = mpsc::channel(1);

    let result = watch_plugin_dir(&missing, missing.join("kubelet.sock"), tx);
    assert!(result.is_err());
    Ok(())
}
