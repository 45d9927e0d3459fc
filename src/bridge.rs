// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-thread event bridge.
//!
//! Push callbacks fire on the transport's own execution context. State,
//! however, is owned by the cooperative scheduler. The bridge carries
//! events across that boundary over a channel: the foreign side calls
//! [`EventBridge::forward`], which never blocks, and the coordinator
//! drains the receiver on the scheduler that owns the state. A single
//! channel preserves delivery order, which covers the per-device FIFO
//! guarantee (cross-device ordering is not promised).

use tokio::sync::mpsc;

use crate::transport::TransportEvent;

/// Sending half of the bridge, handed to transport callbacks.
#[derive(Debug, Clone)]
pub struct EventBridge {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventBridge {
    /// Creates a bridge and the receiver the coordinator will drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forwards an event onto the owning scheduler.
    ///
    /// Returns immediately. If the receiving side has shut down, the
    /// event is dropped and logged; the transport's caller must never see
    /// a failure from here.
    pub fn forward(&self, event: TransportEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event bridge closed, dropping event");
        }
    }
}
