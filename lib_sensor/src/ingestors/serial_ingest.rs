//! # Serial Ingestion Loop
//!
//! A single sequential loop: read a frame, decode it, extract values,
//! validate, persist, report rolling averages, wait, repeat. Nothing here runs
//! in parallel; the sensor is one producer and rows are written in the order
//! lines arrive.
//!
//! ## States
//! [`IngestionLoop::connect`] sets up the store and yields a loop in `Ready`.
//! From there: `Ready → Reading → (Parsed | Unparsed) → Reading …`, ending in
//! `Aborted` when too many consecutive lines fail to parse. That threshold is
//! a circuit breaker for a miswired or misconfigured device. A line that looks
//! like a device status message (for example a boot banner) resets the
//! failure counter instead of counting against it.
//!
//! ## Shutdown
//! Every wait races the cancellation token. Whichever state the loop is in
//! when the token fires, the serial link and the store are both closed before
//! `run` returns.

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connections::db_postgres::DbError;
use crate::connections::reading_store::{ReadingStore, StoreConnector};
use crate::ingestors::decoder::ByteStreamDecoder;
use crate::ingestors::extractor::MeasurementExtractor;
use crate::ingestors::serial_link::{LineSource, SerialError};
use crate::ingestors::validator::validate;
use crate::models::reading::Measurements;

/// Keywords marking a harmless device status line (matched case-insensitively).
pub const SYSTEM_MESSAGE_KEYWORDS: &[&str] = &["sensor", "initializ", "初始化"];

/// Number of recent values kept per measurement.
pub const WINDOW_CAPACITY: usize = 50;
/// Number of samples in the reported sliding average.
pub const AVERAGE_SPAN: usize = 5;

/// Errors that stop the loop before or outside the circuit breaker.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Serial link error: {0}")]
    Serial(#[from] SerialError),
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Ready,
    Reading,
    Parsed,
    Unparsed,
    Aborted,
}

/// What happened to a single non-empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// At least one value was extracted; `stored` is `false` if the reading was dropped.
    Parsed { stored: bool, warnings: usize },
    /// A device status message; the failure counter was reset.
    SystemMessage,
    /// Nothing extracted; `consecutive` failures so far.
    Unparsed { consecutive: u32 },
    /// The failure threshold was reached.
    Aborted,
}

/// How `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestExit {
    /// The cancellation token fired.
    Stopped,
    /// The circuit breaker tripped.
    Aborted { consecutive_failures: u32 },
}

/// Timing and threshold knobs.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Wait before flushing input, while the device resets after the port opens.
    pub warmup: Duration,
    /// Wait when no line is available.
    pub idle_wait: Duration,
    /// Wait after every processed line.
    pub read_delay: Duration,
    /// Consecutive unparsable lines that abort the loop.
    pub max_consecutive_failures: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(3),
            idle_wait: Duration::from_millis(100),
            read_delay: Duration::from_secs(5),
            max_consecutive_failures: 10,
        }
    }
}

/// `true` for lines the device prints about itself rather than readings.
pub fn is_system_message(line: &str) -> bool {
    let lower = line.to_lowercase();
    SYSTEM_MESSAGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// # Rolling Windows
///
/// The last `WINDOW_CAPACITY` values per measurement, oldest evicted first.
#[derive(Debug, Clone, Default)]
pub struct RollingWindows {
    ph: VecDeque<f64>,
    orp: VecDeque<i32>,
    ntu: VecDeque<i32>,
}

impl RollingWindows {
    pub fn push(&mut self, m: &Measurements) {
        if let Some(v) = m.acidity {
            push_capped(&mut self.ph, v);
        }
        if let Some(v) = m.redox {
            push_capped(&mut self.orp, v);
        }
        if let Some(v) = m.turbidity {
            push_capped(&mut self.ntu, v);
        }
    }

    /// Mean of the newest `AVERAGE_SPAN` pH values, once that many exist.
    pub fn ph_average(&self) -> Option<f64> {
        tail_mean(self.ph.iter().copied())
    }

    pub fn orp_average(&self) -> Option<f64> {
        tail_mean(self.orp.iter().map(|&v| f64::from(v)))
    }

    pub fn ntu_average(&self) -> Option<f64> {
        tail_mean(self.ntu.iter().map(|&v| f64::from(v)))
    }

    pub fn lens(&self) -> (usize, usize, usize) {
        (self.ph.len(), self.orp.len(), self.ntu.len())
    }
}

fn push_capped<T>(window: &mut VecDeque<T>, value: T) {
    if window.len() == WINDOW_CAPACITY {
        window.pop_front();
    }
    window.push_back(value);
}

fn tail_mean<I>(values: I) -> Option<f64>
where
    I: DoubleEndedIterator<Item = f64> + ExactSizeIterator,
{
    if values.len() < AVERAGE_SPAN {
        return None;
    }
    let sum: f64 = values.rev().take(AVERAGE_SPAN).sum();
    Some(sum / AVERAGE_SPAN as f64)
}

/// # Ingestion Loop
///
/// Owns the line source and the write-side store for its whole life.
pub struct IngestionLoop<L: LineSource, C: StoreConnector> {
    source: L,
    store: ReadingStore<C>,
    decoder: ByteStreamDecoder,
    extractor: MeasurementExtractor,
    settings: IngestSettings,
    windows: RollingWindows,
    consecutive_failures: u32,
    state: IngestState,
}

impl<L: LineSource, C: StoreConnector> IngestionLoop<L, C> {
    /// Connects the store and creates the schema; the loop starts out `Ready`.
    ///
    /// Any failure here is fatal; the source is closed before the error is returned.
    pub async fn connect(mut source: L, connector: C, settings: IngestSettings) -> Result<Self, IngestError> {
        let mut store = ReadingStore::new(connector);
        let setup = async {
            store.connect().await?;
            store.ensure_schema().await
        };
        if let Err(e) = setup.await {
            error!(error = %e, "Store setup failed");
            source.close().await;
            store.close();
            return Err(e.into());
        }

        Ok(Self {
            source,
            store,
            decoder: ByteStreamDecoder::default(),
            extractor: MeasurementExtractor::new(),
            settings,
            windows: RollingWindows::default(),
            consecutive_failures: 0,
            state: IngestState::Ready,
        })
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn windows(&self) -> &RollingWindows {
        &self.windows
    }

    /// Runs until cancelled or until the circuit breaker trips, then releases
    /// the serial link and the store.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<IngestExit, IngestError> {
        let exit = self.drive(&cancel).await;
        self.source.close().await;
        self.store.close();
        match &exit {
            Ok(IngestExit::Stopped) => info!("Ingestion stopped"),
            Ok(IngestExit::Aborted { consecutive_failures }) => {
                error!(consecutive_failures, "Ingestion aborted: check the device program or its connection")
            }
            Err(e) => error!(error = %e, "Ingestion failed"),
        }
        exit
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<IngestExit, IngestError> {
        if !self.settings.warmup.is_zero() {
            info!(warmup_ms = self.settings.warmup.as_millis() as u64, "Waiting for the device to initialize");
            if pause(self.settings.warmup, cancel).await {
                return Ok(IngestExit::Stopped);
            }
        }
        if let Err(e) = self.source.flush_input().await {
            warn!(error = %e, "Could not flush serial input");
        }

        info!("Reading sensor data");
        self.state = IngestState::Reading;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(IngestExit::Stopped),
                frame = self.source.next_frame() => frame,
            };

            let line = match frame {
                Ok(Some(raw)) => self.decoder.decode(&raw),
                Ok(None) => String::new(),
                Err(SerialError::Closed) => return Err(SerialError::Closed.into()),
                Err(e) => {
                    warn!(error = %e, "Error while reading serial data");
                    String::new()
                }
            };

            if line.is_empty() {
                if pause(self.settings.idle_wait, cancel).await {
                    return Ok(IngestExit::Stopped);
                }
                continue;
            }

            if self.process_line(&line).await == LineOutcome::Aborted {
                return Ok(IngestExit::Aborted {
                    consecutive_failures: self.consecutive_failures,
                });
            }

            if pause(self.settings.read_delay, cancel).await {
                return Ok(IngestExit::Stopped);
            }
            self.state = IngestState::Reading;
        }
    }

    /// Handles one decoded, non-empty line.
    pub async fn process_line(&mut self, line: &str) -> LineOutcome {
        debug!(raw = ?line, "Received line");
        let m = self.extractor.extract(line);

        if m.is_empty() {
            self.state = IngestState::Unparsed;
            return self.record_failure(line);
        }

        self.state = IngestState::Parsed;
        self.consecutive_failures = 0;

        let warnings = validate(&m);
        for w in &warnings {
            warn!("Validation warning: {}", w);
        }

        self.windows.push(&m);
        info!(reading = %m, "Parsed reading");

        let stored = self.store.append(m).await.is_ok();
        self.log_averages();

        LineOutcome::Parsed {
            stored,
            warnings: warnings.len(),
        }
    }

    fn record_failure(&mut self, line: &str) -> LineOutcome {
        if is_system_message(line) {
            info!(message = %line, "System message");
            self.consecutive_failures = 0;
            return LineOutcome::SystemMessage;
        }

        self.consecutive_failures += 1;
        let max = self.settings.max_consecutive_failures;
        warn!(consecutive = self.consecutive_failures, max, "Could not parse line");

        if self.consecutive_failures >= max {
            self.state = IngestState::Aborted;
            return LineOutcome::Aborted;
        }
        LineOutcome::Unparsed {
            consecutive: self.consecutive_failures,
        }
    }

    fn log_averages(&self) {
        if let Some(avg) = self.windows.ph_average() {
            info!("Average of last {} pH readings: {:.2}", AVERAGE_SPAN, avg);
        }
        if let Some(avg) = self.windows.orp_average() {
            info!("Average of last {} ORP readings: {:.0}mV", AVERAGE_SPAN, avg);
        }
        if let Some(avg) = self.windows.ntu_average() {
            info!("Average of last {} NTU readings: {:.0}", AVERAGE_SPAN, avg);
        }
    }
}

/// Sleeps for `duration`; returns `true` if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
