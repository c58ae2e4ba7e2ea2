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

use clap::Parser;
use devicelink_config::device_plugin::{
    AVAILABLE_DEVICES_ENV, DEVICE_PATH, DevicePluginConfig, device_count_from_env,
};
use devicelink_controller::event_sources::EventSources;
use devicelink_controller::restart_controller::RestartController;
use devicelink_error::{Error, ResultExt};
use devicelink_service::plugin_lifecycle::DevicePluginFactory;
use devicelink_util::init_tracing;
use tracing::{Instrument, debug, info, trace_span};

/// Kubernetes device plugin advertising /dev/kvm to the kubelet.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Optional JSON5 config file. Every setting has a default.
    #[clap(long, value_parser)]
    config: Option<String>,
}

fn get_config(args: &Args) -> Result<DevicePluginConfig, Error> {
    let Some(config_file) = &args.config else {
        return Ok(DevicePluginConfig::default());
    };
    let json_contents = std::fs::read_to_string(config_file)
        .err_tip(|| format!("Could not open config file {config_file}"))?;
    serde_json5::from_str(&json_contents)
        .err_tip(|| format!("Could not parse config file {config_file}"))
}

async fn inner_main(config: DevicePluginConfig) -> Result<(), Error> {
    let device_count = device_count_from_env();
    debug!(env = AVAILABLE_DEVICES_ENV, device_count, "Resolved device count");
    info!(device_path = DEVICE_PATH, device_count, "Starting device plugin daemon");

    let (_sources, events) =
        EventSources::start(&config.device_plugin_dir(), config.kubelet_socket_path())
            .err_tip(|| "Failed to set up event sources")?;

    let factory = DevicePluginFactory::new(DEVICE_PATH, device_count, config);
    RestartController::new(factory)
        .run(events)
        .await
        .err_tip(|| "Restart controller failed")?;
    info!("Device plugin daemon stopped");
    Ok(())
}

fn main() -> Result<(), Box<dyn core::error::Error>> {
    init_tracing()?;

    let args = Args::parse();
    let config = get_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime
        .block_on(inner_main(config).instrument(trace_span!("main")))
        .err_tip(|| "main() function failed")?;
    Ok(())
}
