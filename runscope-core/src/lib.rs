//! # runscope-core
//!
//! Core library for runscope - a live viewer for agent execution traces.
//!
//! This library provides:
//! - Wire types and frame decoding for the viewer channel
//! - Incremental reconstruction of the message/tool call tree
//! - Column layout for overlapping sections
//! - Debounced run selection with stale-event gating
//! - A reconnecting WebSocket connection
//! - Configuration, preferences, logging and frame recordings
//!
//! ## Data flow
//!
//! Frames arrive on the [`ConnectionManager`] task and are handed, one at a
//! time, to [`dispatch`], which decodes them and applies them to a
//! [`ViewerState`]. The state owns the [`RunRegistry`] and, for the selected
//! run, a [`RunSession`] with its [`TraceTree`] and [`SectionLayout`].
//!
//! ## Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use runscope_core::{dispatch, ViewerState};
//!
//! let mut state = ViewerState::new(Duration::from_millis(100));
//! let selection = state.select_now(3).expect("fresh state has no selection");
//! assert_eq!(selection.epoch, 1);
//!
//! dispatch(
//!     &mut state,
//!     r#"{"type":"MessageStreamPart","data":{"run_id":3,"message_id":1,"content":"hi"}}"#,
//!     Instant::now(),
//! );
//! let session = state.session().unwrap();
//! assert_eq!(session.trace.get(1).unwrap().content, "hi");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, RequestSink};
pub use dispatch::{dispatch, IgnoreReason, Outcome};
pub use error::{Error, Result};
pub use layout::{Interval, Placement, SectionLayout, OPEN_END};
pub use preferences::{Location, Preferences};
pub use protocol::{decode_frame, EventKind, Frame, InboundEvent, OutboundRequest};
pub use registry::{RunRegistry, Selection};
pub use state::{Lane, LaneMark, RunSession, ViewerState};
pub use trace::{MessageNode, ToolCallNode, TraceTree};
pub use types::*;

// Public modules
pub mod config;
pub mod connection;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod layout;
pub mod logging;
pub mod preferences;
pub mod protocol;
pub mod registry;
pub mod replay;
pub mod state;
pub mod trace;
pub mod types;
