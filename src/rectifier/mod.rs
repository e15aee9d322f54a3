//! Ranged streaming read adapter
//!
//! Turns a client performing sequential reads into one long-running ranged
//! HTTP GET. Bytes are buffered and delivered in arrival order with a
//! bounded look-ahead window; the upstream is paused when the stream runs
//! too far ahead of the readers and resumed as they catch up. When the
//! origin ignores the range request the body is consumed from byte zero
//! and reads skip forward to their offsets.

pub mod core;

use crate::error::{Error, NtStatus, Result};
use reqwest::header::{HeaderMap, RANGE};
use reqwest::StatusCode;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use self::core::{Flow, RectifierCore, Registration};

pub struct Rectifier {
    state: Arc<Mutex<RectifierCore>>,
    resume: Arc<Notify>,
    cancel: CancellationToken,
}

impl Rectifier {
    /// Start streaming `url` from `start_offset`. The driver task runs
    /// until the body ends, the transfer fails, or [`close`] aborts it.
    pub fn new(
        client: reqwest::Client,
        url: String,
        headers: HeaderMap,
        size: u64,
        start_offset: u64,
    ) -> Self {
        let state = Arc::new(Mutex::new(RectifierCore::new(size, start_offset)));
        let resume = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            client,
            url,
            headers,
            start_offset,
            Arc::clone(&state),
            Arc::clone(&resume),
            cancel.clone(),
        ));

        Self {
            state,
            resume,
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RectifierCore> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read up to `buf.len()` bytes at absolute offset `pos`.
    ///
    /// Waits until the stream has reached `pos + buf.len()` (or ended),
    /// then consumes from the buffered head. Successive calls must use
    /// monotonically non-decreasing positions.
    pub async fn read(&self, buf: &mut [u8], pos: u64) -> Result<usize> {
        let target = pos + buf.len() as u64;
        let (registration, resume) = self.lock().register(target);
        if resume {
            self.resume.notify_one();
        }

        match registration {
            Registration::Ready => {}
            Registration::Failed(status) => {
                return Err(Error::status(status, "stream unavailable"))
            }
            Registration::Wait(rx) => match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(status)) => return Err(Error::status(status, "stream failed")),
                Err(_) => {
                    return Err(Error::status(NtStatus::Unsuccessful, "stream closed"))
                }
            },
        }

        let copied = self
            .lock()
            .consume(buf, pos)
            .map_err(|status| Error::status(status, "sequential read violation"))?;
        trace!(pos, copied, "rectifier read");
        Ok(copied)
    }

    /// Abort the transfer and fail any outstanding waiters.
    pub fn close(&self) {
        self.cancel.cancel();
        self.resume.notify_one();
        self.lock().close();
    }
}

impl Drop for Rectifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    start_offset: u64,
    state: Arc<Mutex<RectifierCore>>,
    resume: Arc<Notify>,
    cancel: CancellationToken,
) {
    fn lock(state: &Arc<Mutex<RectifierCore>>) -> MutexGuard<'_, RectifierCore> {
        state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    let request = client
        .get(&url)
        .headers(headers)
        .header(RANGE, format!("bytes={}-", start_offset));

    let response = tokio::select! {
        _ = cancel.cancelled() => return,
        response = request.send() => response,
    };

    let mut response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "range request failed");
            lock(&state).on_error(NtStatus::Unsuccessful);
            return;
        }
    };

    if !response.status().is_success() {
        warn!(url = %url, status = %response.status(), "origin rejected request");
        lock(&state).on_error(NtStatus::Unsuccessful);
        return;
    }
    if response.status() != StatusCode::PARTIAL_CONTENT {
        // Origin ignored the range; serve the whole body and let readers
        // skip forward to their offsets.
        debug!(url = %url, status = %response.status(), "range not honoured, streaming whole body");
        lock(&state).reset_whole_body();
    }

    loop {
        loop {
            if cancel.is_cancelled() || lock(&state).is_closed() {
                return;
            }
            if !lock(&state).is_paused() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = resume.notified() => {}
            }
        }

        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = response.chunk() => chunk,
        };

        match chunk {
            Ok(Some(bytes)) => {
                let flow = lock(&state).on_chunk(bytes);
                if flow == Flow::Pause {
                    trace!(url = %url, "upstream paused");
                }
            }
            Ok(None) => {
                debug!(url = %url, "stream complete");
                lock(&state).on_complete();
                return;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "stream error");
                lock(&state).on_error(NtStatus::Unsuccessful);
                return;
            }
        }
    }
}
