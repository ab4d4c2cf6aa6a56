//! ScanLoop — fixed-cadence capture → decode driver.
//!
//! Every tick spawns one capture+decode job and forwards its outcome to the
//! core as a `DaemonEvent`.  Jobs never overlap: a tick that fires while the
//! previous job is still running is dropped, not queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagtune_proto::error::ScanError;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::core::DaemonEvent;

/// One grayscale frame, one byte of luma per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize
    }
}

pub trait FrameSource: Send + Sync + 'static {
    fn capture_frame(&self) -> impl Future<Output = Result<PixelBuffer, ScanError>> + Send;
}

pub trait CodeDecoder: Send + Sync + 'static {
    fn decode(
        &self,
        frame: &PixelBuffer,
    ) -> impl Future<Output = Result<Option<String>, ScanError>> + Send;
}

/// Clears the in-flight flag when the job finishes, even if it is aborted.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Abort handle of the capture+decode job currently running, if any.
type JobSlot = Arc<Mutex<Option<AbortHandle>>>;

fn take_job(slot: &JobSlot) -> Option<AbortHandle> {
    match slot.lock() {
        Ok(mut job) => job.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

fn put_job(slot: &JobSlot, handle: AbortHandle) {
    match slot.lock() {
        Ok(mut job) => *job = Some(handle),
        Err(poisoned) => *poisoned.into_inner() = Some(handle),
    }
}

/// The in-flight flag and job slot outlive restarts, so a job from a stopped
/// loop still blocks the next loop's first tick until it is gone.
#[derive(Default)]
pub struct ScanLoop {
    handle: Option<JoinHandle<()>>,
    in_flight: Arc<AtomicBool>,
    job: JobSlot,
}

impl ScanLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start ticking every `period`.  Restarts the loop if it is running.
    pub fn start<F, D>(
        &mut self,
        source: Arc<F>,
        decoder: Arc<D>,
        period: Duration,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) where
        F: FrameSource,
        D: CodeDecoder,
    {
        self.stop();
        info!("scan: starting, period {:?}", period);
        self.handle = Some(tokio::spawn(run(
            source,
            decoder,
            period,
            event_tx,
            self.in_flight.clone(),
            self.job.clone(),
        )));
    }

    /// Stops ticking and aborts the job in flight; no result from before
    /// the stop is delivered afterwards.
    pub fn stop(&mut self) {
        if self.is_running() {
            info!("scan: stopped");
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        if let Some(job) = take_job(&self.job) {
            job.abort();
        }
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<F, D>(
    source: Arc<F>,
    decoder: Arc<D>,
    period: Duration,
    event_tx: mpsc::Sender<DaemonEvent>,
    in_flight: Arc<AtomicBool>,
    job: JobSlot,
) where
    F: FrameSource,
    D: CodeDecoder,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if event_tx.is_closed() {
            debug!("scan: event channel closed, exiting");
            break;
        }
        if in_flight.swap(true, Ordering::AcqRel) {
            debug!("scan: previous decode still running, dropping tick");
            continue;
        }

        let guard = InFlight(in_flight.clone());
        let source = source.clone();
        let decoder = decoder.clone();
        let tx = event_tx.clone();
        let handle = tokio::spawn(async move {
            let event = match scan_once(source.as_ref(), decoder.as_ref()).await {
                Ok(tag) => DaemonEvent::Observed(tag),
                Err(e) => DaemonEvent::ScanFailed(e),
            };
            let _ = tx.send(event).await;
            drop(guard);
        });
        put_job(&job, handle.abort_handle());
    }
}

async fn scan_once<F, D>(source: &F, decoder: &D) -> Result<Option<String>, ScanError>
where
    F: FrameSource,
    D: CodeDecoder,
{
    let frame = source.capture_frame().await?;
    decoder.decode(&frame).await
}
