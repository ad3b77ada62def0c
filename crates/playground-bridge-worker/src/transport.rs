//! Message-passing between the host adapter and the worker thread.
//!
//! Each direction is an unbounded channel of encoded frames. The host side
//! is async; the worker side blocks, since the worker thread owns the
//! runtime and has nothing else to do while waiting.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::codec;
use crate::protocol::{HostFrame, WorkerFrame};
use playground_bridge_common::BridgeError;

/// Sending half for frames of type `F`.
pub struct FrameSender<F> {
    tx: mpsc::UnboundedSender<String>,
    _frame: PhantomData<fn(F)>,
}

impl<F> Clone for FrameSender<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _frame: PhantomData,
        }
    }
}

impl<F: Serialize> FrameSender<F> {
    /// Encode and send a frame.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::WorkerUnavailable`] if the other side is gone,
    /// or a transport error if the frame cannot be encoded.
    pub fn send(&self, frame: &F) -> Result<(), BridgeError> {
        let text = codec::encode(frame)?;
        self.tx
            .send(text)
            .map_err(|_| BridgeError::WorkerUnavailable)
    }

    /// Returns `true` once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half for frames of type `F`.
pub struct FrameReceiver<F> {
    rx: mpsc::UnboundedReceiver<String>,
    _frame: PhantomData<fn() -> F>,
}

impl<F: DeserializeOwned> FrameReceiver<F> {
    /// Receive the next frame.
    ///
    /// `None` once every sender is gone. A frame that fails to decode is
    /// returned as an error and does not end the stream.
    pub async fn recv(&mut self) -> Option<Result<F, BridgeError>> {
        self.rx.recv().await.map(|text| codec::decode(&text))
    }

    /// Blocking variant of [`recv`](Self::recv) for the worker thread.
    ///
    /// Must not be called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<Result<F, BridgeError>> {
        self.rx.blocking_recv().map(|text| codec::decode(&text))
    }
}

/// The host adapter's end of the transport.
pub struct HostEnd {
    /// Frames to the worker.
    pub sender: FrameSender<HostFrame>,
    /// Frames from the worker.
    pub receiver: FrameReceiver<WorkerFrame>,
}

/// The worker's end of the transport.
pub struct WorkerEnd {
    /// Frames to the host.
    pub sender: FrameSender<WorkerFrame>,
    /// Frames from the host.
    pub receiver: FrameReceiver<HostFrame>,
}

fn pair<F>() -> (FrameSender<F>, FrameReceiver<F>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FrameSender {
            tx,
            _frame: PhantomData,
        },
        FrameReceiver {
            rx,
            _frame: PhantomData,
        },
    )
}

/// Create a connected pair of transport ends.
pub fn channel() -> (HostEnd, WorkerEnd) {
    let (to_worker, from_host) = pair();
    let (to_host, from_worker) = pair();

    (
        HostEnd {
            sender: to_worker,
            receiver: from_worker,
        },
        WorkerEnd {
            sender: to_host,
            receiver: from_host,
        },
    )
}
