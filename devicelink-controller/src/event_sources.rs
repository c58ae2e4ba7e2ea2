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

use devicelink_error::{Error, ResultExt};
use devicelink_util::spawn;
use devicelink_util::task::JoinHandleDropGuard;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::restart_controller::ControllerEvent;

/// Events buffered between the sources and the controller.
const EVENT_CHANNEL_CAPACITY: usize = 16;

const SIGHUP: &str = "SIGHUP";

/// Signals the daemon reacts to. Everything but `SIGHUP` terminates.
fn handled_signals() -> [(SignalKind, &'static str); 4] {
    [
        (SignalKind::hangup(), SIGHUP),
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::quit(), "SIGQUIT"),
    ]
}

/// Maps a filesystem notification to a controller event. Only the creation
/// of the kubelet socket matters.
pub fn classify_fs_event(event: &Event, kubelet_socket: &Path) -> Option<ControllerEvent> {
    let created = matches!(event.kind, EventKind::Create(_));
    (created && event.paths.iter().any(|path| path == kubelet_socket))
        .then_some(ControllerEvent::KubeletRestarted)
}

pub fn classify_signal(name: &str) -> ControllerEvent {
    if name == SIGHUP {
        ControllerEvent::Reload
    } else {
        ControllerEvent::Terminate(name.to_string())
    }
}

/// Watches `plugin_dir` (non recursively) and forwards kubelet restarts and
/// watch errors into `tx`.
pub fn watch_plugin_dir(
    plugin_dir: &Path,
    kubelet_socket: PathBuf,
    tx: mpsc::Sender<ControllerEvent>,
) -> Result<RecommendedWatcher, Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        let event = match res {
            Ok(event) => classify_fs_event(&event, &kubelet_socket),
            Err(err) => Some(ControllerEvent::WatchError(err.to_string())),
        };
        if let Some(event) = event {
            if tx.blocking_send(event).is_err() {
                debug!("Controller gone, dropping filesystem event");
            }
        }
    })
    .err_tip(|| "Failed to create plugin directory watcher")?;
    watcher
        .watch(plugin_dir, RecursiveMode::NonRecursive)
        .err_tip(|| format!("Failed to watch {}", plugin_dir.display()))?;
    info!(plugin_dir = %plugin_dir.display(), "Watching plugin directory");
    Ok(watcher)
}

/// Spawns one task per handled signal forwarding it into `tx`.
pub fn forward_signals(
    tx: &mpsc::Sender<ControllerEvent>,
) -> Result<Vec<JoinHandleDropGuard<()>>, Error> {
    let mut tasks = Vec::with_capacity(handled_signals().len());
    for (kind, name) in handled_signals() {
        let mut stream =
            signal(kind).err_tip(|| format!("Failed to install {name} handler"))?;
        let tx = tx.clone();
        tasks.push(spawn!(
            "signal_forwarder",
            async move {
                while stream.recv().await.is_some() {
                    debug!(signal = name, "Signal received");
                    if tx.send(classify_signal(name)).await.is_err() {
                        break;
                    }
                }
            },
            signal = name
        ));
    }
    Ok(tasks)
}

/// Keeps the watcher and signal forwarders alive for as long as it exists.
#[derive(Debug)]
pub struct EventSources {
    _watcher: RecommendedWatcher,
    _signal_tasks: Vec<JoinHandleDropGuard<()>>,
}

impl EventSources {
    /// Starts every event source. The returned receiver closes once this
    /// value is dropped.
    pub fn start(
        plugin_dir: &Path,
        kubelet_socket: PathBuf,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>), Error> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = watch_plugin_dir(plugin_dir, kubelet_socket, tx.clone())?;
        let signal_tasks = forward_signals(&tx)?;
        Ok((
            Self {
                _watcher: watcher,
                _signal_tasks: signal_tasks,
            },
            rx,
        ))
    }
}
