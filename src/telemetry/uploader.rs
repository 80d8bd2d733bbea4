use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::errors::RacewalkError;

use super::queue::EventQueue;
use super::transport::EventTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Nothing was queued, no request was made
    Idle,
    /// Another upload was already running, no request was made
    Coalesced,
    /// The batch reached the server; `acknowledged` events were removed
    Delivered { sent: usize, acknowledged: usize },
}

/// Something the session can ask for an upload without caring how it runs
pub trait UploadScheduler: Send + Sync {
    fn request_upload(&self);
}

impl<T: UploadScheduler + ?Sized> UploadScheduler for Arc<T> {
    fn request_upload(&self) {
        (**self).request_upload()
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves queued events to the server.
///
/// Events are only removed once the server acknowledges them, so a failed or
/// partial upload simply leaves the rest for the next attempt. At most one
/// upload runs at a time.
pub struct Uploader {
    queue: Arc<EventQueue>,
    transport: Box<dyn EventTransport>,
    in_flight: AtomicBool,
}

impl Uploader {
    pub fn new(queue: Arc<EventQueue>, transport: impl EventTransport + 'static) -> Self {
        Self {
            queue,
            transport: Box::new(transport),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn upload(&self) -> Result<UploadOutcome, RacewalkError> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Upload already in flight, skipping");
            return Ok(UploadOutcome::Coalesced);
        };

        let batch = self.queue.serialize_all();
        if batch.is_empty() {
            return Ok(UploadOutcome::Idle);
        }

        let acknowledged_ids = self.transport.post_batch(&batch)?;
        let acknowledged = self.queue.remove_acknowledged(&acknowledged_ids);
        if acknowledged < batch.len() {
            debug!(
                "{} of {} events not acknowledged, keeping them for the next upload",
                batch.len() - acknowledged,
                batch.len()
            );
        }
        info!(
            "Uploaded {} events, {} acknowledged, {} pending",
            batch.len(),
            acknowledged,
            self.queue.size()
        );

        Ok(UploadOutcome::Delivered {
            sent: batch.len(),
            acknowledged,
        })
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

impl UploadScheduler for Uploader {
    fn request_upload(&self) {
        if let Err(e) = self.upload() {
            warn!("Upload failed, events stay queued: {}", e);
        }
    }
}

/// Runs uploads on a dedicated thread so producers never wait on the network.
///
/// Triggers that pile up while an upload is running collapse into a single
/// follow-up attempt.
pub struct UploadWorker {
    trigger_sender: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl UploadWorker {
    pub fn spawn(uploader: Arc<Uploader>) -> Self {
        let (trigger_sender, trigger_receiver) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            while trigger_receiver.recv().is_ok() {
                while trigger_receiver.try_recv().is_ok() {}
                match uploader.upload() {
                    Ok(outcome) => debug!("Upload finished: {:?}", outcome),
                    Err(e) => warn!("Upload failed, events stay queued: {}", e),
                }
            }
            debug!("Upload worker stopped");
        });

        Self {
            trigger_sender: Some(trigger_sender),
            handle: Some(handle),
        }
    }

    pub fn trigger(&self) {
        if let Some(sender) = &self.trigger_sender {
            if sender.send(()).is_err() {
                warn!("Upload worker is not running, upload request dropped");
            }
        }
    }

    /// Whether the upload thread is still accepting triggers
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop accepting triggers and wait for the pending attempt to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.trigger_sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Upload worker panicked");
            }
        }
    }
}

impl UploadScheduler for UploadWorker {
    fn request_upload(&self) {
        self.trigger();
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
