// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for starting a batcher.

/// Errors that can occur while starting a [`Batcher`](crate::batcher::Batcher).
///
/// Appending and shutting down never fail; only bringing up the background
/// staleness poller can.
#[derive(Debug, thiserror::Error)]
pub enum Creation {
    #[error("failed to build staleness poller runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn staleness poller thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let error = Creation::Spawn(std::io::Error::other("no threads left"));
        assert_eq!(
            error.to_string(),
            "failed to spawn staleness poller thread: no threads left"
        );
        assert!(error.source().is_some());
    }
}
