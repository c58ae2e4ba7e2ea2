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

use devicelink_controller::restart_controller::{
    ControllerEvent, ControllerState, RestartController,
};
use devicelink_error::Code;
use devicelink_macro::devicelink_test;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

mod utils {
    pub(crate) mod mock_plugin;
}

use utils::mock_plugin::{MockPluginFactory, PluginCall, recorded_calls};

/// Queues `events` and closes the channel behind them.
fn event_channel(events: Vec<ControllerEvent>) -> mpsc::Receiver<ControllerEvent> {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.try_send(event).expect("channel has room");
    }
    rx
}

#[devicelink_test]
async fn initial_start_serves_one_plugin() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    assert_eq!(controller.state(), ControllerState::NeedsRestart);

    controller.ensure_serving().await?;

    assert_eq!(controller.state(), ControllerState::Serving);
    assert!(controller.plugin().is_some());
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![PluginCall::Create(0), PluginCall::Serve(0)]
    );

    // Nothing pending, nothing happens.
    controller.ensure_serving().await?;
    assert!(recorded_calls(&mut rx_call).is_empty());
    Ok(())
}

#[devicelink_test]
async fn kubelet_restart_stops_then_serves_once() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    controller.ensure_serving().await?;
    recorded_calls(&mut rx_call);

    let state = controller
        .handle_event(ControllerEvent::KubeletRestarted)
        .await;
    assert_eq!(state, ControllerState::NeedsRestart);
    assert!(recorded_calls(&mut rx_call).is_empty());

    controller.ensure_serving().await?;
    assert_eq!(controller.state(), ControllerState::Serving);
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Stop(0),
            PluginCall::Create(1),
            PluginCall::Serve(1)
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn reload_restarts_without_exit() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    controller.ensure_serving().await?;

    let state = controller.handle_event(ControllerEvent::Reload).await;
    assert_eq!(state, ControllerState::NeedsRestart);
    controller.ensure_serving().await?;

    assert_eq!(controller.state(), ControllerState::Serving);
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Create(0),
            PluginCall::Serve(0),
            PluginCall::Stop(0),
            PluginCall::Create(1),
            PluginCall::Serve(1),
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn watch_error_changes_nothing() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    controller.ensure_serving().await?;
    recorded_calls(&mut rx_call);

    let state = controller
        .handle_event(ControllerEvent::WatchError("inotify overflow".to_string()))
        .await;
    assert_eq!(state, ControllerState::Serving);
    controller.ensure_serving().await?;
    assert!(recorded_calls(&mut rx_call).is_empty());
    Ok(())
}

#[devicelink_test]
async fn terminate_stops_exactly_once() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);

    controller
        .run(event_channel(vec![ControllerEvent::Terminate(
            "SIGTERM".to_string(),
        )]))
        .await?;

    assert_eq!(controller.state(), ControllerState::Terminating);
    assert!(controller.plugin().is_none());
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Create(0),
            PluginCall::Serve(0),
            PluginCall::Stop(0)
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn terminate_tolerates_stop_failure() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, switches, mut rx_call) = MockPluginFactory::new();
    switches.set_fail_stop(true);
    let mut controller = RestartController::new(factory);

    controller
        .run(event_channel(vec![ControllerEvent::Terminate(
            "SIGINT".to_string(),
        )]))
        .await?;

    assert_eq!(controller.state(), ControllerState::Terminating);
    assert_eq!(recorded_calls(&mut rx_call).last(), Some(&PluginCall::Stop(0)));
    Ok(())
}

#[devicelink_test]
async fn run_restarts_on_each_trigger() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);

    controller
        .run(event_channel(vec![
            ControllerEvent::KubeletRestarted,
            ControllerEvent::Reload,
            ControllerEvent::Terminate("SIGQUIT".to_string()),
        ]))
        .await?;

    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Create(0),
            PluginCall::Serve(0),
            PluginCall::Stop(0),
            PluginCall::Create(1),
            PluginCall::Serve(1),
            PluginCall::Stop(1),
            PluginCall::Create(2),
            PluginCall::Serve(2),
            PluginCall::Stop(2),
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn closed_event_channel_shuts_down() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);

    controller.run(event_channel(Vec::new())).await?;

    assert_eq!(controller.state(), ControllerState::Terminating);
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Create(0),
            PluginCall::Serve(0),
            PluginCall::Stop(0)
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn failed_serve_waits_for_next_event() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, switches, mut rx_call) = MockPluginFactory::new();
    switches.set_fail_serve(true);
    let mut controller = RestartController::new(factory);

    controller.ensure_serving().await?;
    assert_eq!(controller.state(), ControllerState::NeedsRestart);
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![PluginCall::Create(0), PluginCall::Serve(0)]
    );

    switches.set_fail_serve(false);
    controller
        .handle_event(ControllerEvent::KubeletRestarted)
        .await;
    controller.ensure_serving().await?;
    assert_eq!(controller.state(), ControllerState::Serving);
    assert_eq!(
        recorded_calls(&mut rx_call),
        vec![
            PluginCall::Stop(0),
            PluginCall::Create(1),
            PluginCall::Serve(1)
        ]
    );
    Ok(())
}

#[devicelink_test]
async fn missing_device_is_fatal() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, switches, mut rx_call) = MockPluginFactory::new();
    switches.set_device_missing(true);
    let mut controller = RestartController::new(factory);

    let err = controller
        .run(event_channel(Vec::new()))
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::FailedPrecondition);
    assert!(
        err.message_string().contains("/dev/mock"),
        "unexpected error: {err}"
    );
    assert!(recorded_calls(&mut rx_call).is_empty());
    Ok(())
}

#[devicelink_test]
async fn device_removed_before_restart_is_fatal() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, switches, mut rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    controller.ensure_serving().await?;
    recorded_calls(&mut rx_call);

    switches.set_device_missing(true);
    controller.handle_event(ControllerEvent::Reload).await;
    let err = controller.ensure_serving().await.unwrap_err();

    assert_eq!(err.code, Code::FailedPrecondition);
    // The old plugin is still stopped first.
    assert_eq!(recorded_calls(&mut rx_call), vec![PluginCall::Stop(0)]);
    Ok(())
}

#[devicelink_test]
async fn debug_output_shows_state_and_plugin() -> Result<(), Box<dyn core::error::Error>> {
    let (factory, _switches, _rx_call) = MockPluginFactory::new();
    let mut controller = RestartController::new(factory);
    assert!(format!("{controller:?}").contains("NeedsRestart"));

    controller.ensure_serving().await?;
    let debug = format!("{controller:?}");
    assert!(debug.contains("Serving"), "unexpected debug output: {debug}");
    assert!(debug.contains("MockPlugin"), "unexpected debug output: {debug}");
    Ok(())
}
