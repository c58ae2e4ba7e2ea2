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

use std::io::ErrorKind;
use std::path::Path;

use devicelink_error::{Error, ResultExt};
use tracing::{debug, error};

/// Removes the unix socket file at `path`.
///
/// A missing file counts as success. Returns whether a file was removed.
pub async fn remove_socket_file(path: &Path) -> Result<bool, Error> {
    debug!(socket = %path.display(), "Removing socket");
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => {
            error!(socket = %path.display(), ?err, "Could not clean up socket");
            Err(err).err_tip(|| format!("Could not clean up socket {}", path.display()))
        }
    }
}

/// Returns the final path component as a string, or an empty string if there is none.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
