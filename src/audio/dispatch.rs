use super::source::Frame;
use crate::lock::lock_or_recover;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Capture callback body. A poisoned dispatcher keeps receiving audio.
pub(super) fn pump_frames(dispatcher: &Mutex<FrameDispatcher>, data: &[f32]) {
    lock_or_recover(dispatcher, "frame dispatcher").push(data);
}

/// Re-chunks capture callback buffers into exact frames and queues them.
///
/// Runs on the audio callback thread and never blocks. When the queue is full
/// the oldest queued frame is evicted (and counted) so the detection loop
/// always sees the most recent audio.
pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<f32>,
    sender: Sender<Frame>,
    evictor: Receiver<Frame>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        frame_samples: usize,
        sender: Sender<Frame>,
        evictor: Receiver<Frame>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples * 2),
            sender,
            evictor,
            dropped,
        }
    }

    pub(super) fn push(&mut self, data: &[f32]) {
        self.pending.extend_from_slice(data);

        while self.pending.len() >= self.frame_samples {
            let frame: Frame = self.pending.drain(..self.frame_samples).collect();
            if !self.enqueue(frame) {
                break;
            }
        }
    }

    /// Number of samples waiting for the next full frame.
    pub(super) fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    fn enqueue(&mut self, mut frame: Frame) -> bool {
        loop {
            match self.sender.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    if self.evictor.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}
