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

//! gRPC channels over unix domain sockets.

use core::time::Duration;
use std::path::{Path, PathBuf};

use devicelink_error::{Code, Error, ResultExt, make_err};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::time::{Instant, sleep_until, timeout};
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

struct ExponentialBackoff {
    current: Duration,
}

impl ExponentialBackoff {
    const fn new(base: Duration) -> Self {
        Self { current: base }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        Some(delay)
    }
}

async fn connect_once(socket_path: PathBuf) -> Result<Channel, Error> {
    // The authority is never used, the connector below ignores the uri.
    Endpoint::try_from("http://[::]:50051")
        .map_err(|e| make_err!(Code::Internal, "Failed to create endpoint: {e}"))?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = socket_path.clone();
            async move { UnixStream::connect(path).await.map(TokioIo::new) }
        }))
        .await
        .map_err(Error::from)
}

/// Dials the gRPC server listening on `socket_path`.
///
/// Connection attempts are repeated with exponential backoff until one
/// succeeds or `deadline` elapses, which makes this a blocking dial: a socket
/// that appears within the deadline is still reached.
pub async fn dial_unix_socket(socket_path: &Path, deadline: Duration) -> Result<Channel, Error> {
    let give_up_at = Instant::now() + deadline;
    let socket_path = socket_path.to_path_buf();
    let mut backoff = ExponentialBackoff::new(INITIAL_BACKOFF);
    let mut attempt: u32 = 0;
    let mut last_err: Option<Error> = None;

    let dial = async {
        loop {
            attempt += 1;
            match connect_once(socket_path.clone()).await {
                Ok(channel) => return Some(channel),
                Err(err) => {
                    debug!(socket = %socket_path.display(), attempt, ?err, "Dial attempt failed");
                    last_err = Some(err);
                }
            }
            let now = Instant::now();
            if now >= give_up_at {
                return None;
            }
            let delay = backoff.next().unwrap_or(MAX_BACKOFF);
            sleep_until((now + delay).min(give_up_at)).await;
        }
    };

    // The outer timeout also bounds a connect attempt that hangs.
    let result = timeout(deadline, dial).await;
    if let Ok(Some(channel)) = result {
        return Ok(channel);
    }
    let err = last_err.unwrap_or_else(|| make_err!(Code::DeadlineExceeded, ""));
    Err(err.set_code(Code::DeadlineExceeded)).err_tip(|| {
        format!(
            "Could not dial {} within {deadline:?} ({attempt} attempts)",
            socket_path.display()
        )
    })
}
