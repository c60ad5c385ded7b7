//! Signaling plumbing for the baresip SIP user agent
//!
//! sipbot never speaks SIP itself. It drives an external baresip process in two
//! directions:
//!
//! - **Events**: baresip writes free-text lines to stdout. [`EventMonitor`]
//!   reads them one at a time and [`classify`] turns each into a typed
//!   [`SignalingEvent`]. [`spawn_blocking_monitor`] does the same for a
//!   blocking reader such as stdin.
//! - **Commands**: [`ControlChannel`] keeps one connection to baresip's control
//!   socket and writes newline-terminated commands (`/accept`, `/ausrc_mute`,
//!   `/auplay <file>`). Delivery is fire-and-forget.
//!
//! [`SignalingProcess`] writes baresip's configuration and supervises the child.
//!
//! # Example Usage
//!
//! ```no_run
//! use sipbot_signaling::{spawn_blocking_monitor, CommandSink, ControlChannel, ControlEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint: ControlEndpoint = "unix:/tmp/baresip.sock".parse()?;
//!     let control = ControlChannel::new(endpoint);
//!
//!     let (_monitor, mut events) = spawn_blocking_monitor(std::io::stdin());
//!     while let Some(event) = events.recv().await {
//!         if event.is_incoming_call() {
//!             control.accept_call().await;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod error;
pub mod events;
pub mod monitor;
pub mod process;

// Re-exports
pub use control::{CommandSink, ControlChannel, ControlEndpoint};
pub use error::{Result, SignalingError};
pub use events::{classify, EventKind, SignalingEvent};
pub use monitor::{spawn_blocking_monitor, EventMonitor, MonitorSummary};
pub use process::{write_baresip_config, BaresipOptions, SignalingProcess, SipAccount};
