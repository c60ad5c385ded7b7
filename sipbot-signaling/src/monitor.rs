//! Line reader for baresip's event stream

use std::io::BufRead;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{classify, EventKind, SignalingEvent};

/// Counts reported when the monitor stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub lines: usize,
    pub incoming_calls: usize,
    pub call_ends: usize,
}

impl MonitorSummary {
    /// Classify one raw line and count it
    ///
    /// Bytes that are not UTF-8 (a Latin-1 display name, say) are replaced,
    /// never treated as a read failure.
    fn record(&mut self, raw: &[u8]) -> SignalingEvent {
        self.lines += 1;
        let event = classify(&String::from_utf8_lossy(raw));
        match event.kind {
            EventKind::IncomingCall => {
                self.incoming_calls += 1;
                tracing::info!("📞 Incoming call detected: {}", event.raw_line);
            }
            EventKind::CallEnded => {
                self.call_ends += 1;
                tracing::info!("📴 Call ended: {}", event.raw_line);
            }
            _ => tracing::debug!("baresip: {}", event.raw_line),
        }
        event
    }
}

/// Reads the event stream line by line and publishes classified events
///
/// Every line produces exactly one event; after end of stream (or an I/O
/// error) a single [`EventKind::StreamClosed`] event is published. The stream
/// ends when the signaling process exits, so killing the child is the
/// cancellation path; the task handle can also be aborted.
pub struct EventMonitor<R> {
    reader: BufReader<R>,
    tx: mpsc::UnboundedSender<SignalingEvent>,
}

impl<R> EventMonitor<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, tx: mpsc::UnboundedSender<SignalingEvent>) -> Self {
        Self {
            reader: BufReader::new(reader),
            tx,
        }
    }

    /// Spawn a monitor task and hand back the event receiver
    pub fn spawn(
        reader: R,
    ) -> (JoinHandle<MonitorSummary>, mpsc::UnboundedReceiver<SignalingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::new(reader, tx).run());
        (handle, rx)
    }

    /// Read until end of stream
    pub async fn run(mut self) -> MonitorSummary {
        tracing::info!("Starting baresip output monitor");

        let mut summary = MonitorSummary::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            match self.reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Error reading baresip output: {}", e);
                    break;
                }
            }

            if self.tx.send(summary.record(&line)).is_err() {
                tracing::debug!("Event receiver dropped, monitor stopping");
                return summary;
            }
        }

        let _ = self.tx.send(SignalingEvent::stream_closed());
        tracing::info!("Baresip output monitor stopped after {} lines", summary.lines);
        summary
    }
}

/// Monitor a blocking reader such as stdin
///
/// The reads happen on a detached OS thread that hands raw lines to the
/// returned task. Aborting the task stops event delivery right away; the
/// thread stays parked in its read until the process exits and does not hold
/// up runtime shutdown.
pub fn spawn_blocking_monitor<R>(
    reader: R,
) -> (JoinHandle<MonitorSummary>, mpsc::UnboundedReceiver<SignalingEvent>)
where
    R: std::io::Read + Send + 'static,
{
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let spawned = std::thread::Builder::new()
        .name("sipbot-stdin".to_string())
        .spawn(move || {
            let mut reader = std::io::BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading baresip output: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to start reader thread: {}", e);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        tracing::info!("Starting baresip output monitor (blocking reader)");
        let mut summary = MonitorSummary::default();
        while let Some(line) = line_rx.recv().await {
            if tx.send(summary.record(&line)).is_err() {
                return summary;
            }
        }
        let _ = tx.send(SignalingEvent::stream_closed());
        tracing::info!("Baresip output monitor stopped after {} lines", summary.lines);
        summary
    });
    (handle, rx)
}
