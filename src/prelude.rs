//! Convenient imports for Chronicle.
//!
//! Re-exports the types most programs need:
//!
//! ```ignore
//! use chronicle::prelude::*;
//!
//! let dispatcher = Dispatcher::new(DispatchConfig::new(".chronicle"));
//! ```

// Recording
pub use chronicle_dispatch::{DispatchOutcome, Dispatcher};

// Configuration
pub use chronicle_core::{ChainOptions, DeltaOptions, DispatchConfig};

// Input and persisted shapes
pub use chronicle_core::{ErrorCode, ErrorRecord, Event, EventStatus, InteractionRecord, Value};

// Direct engine access
pub use chronicle_chain::ChainLog;
pub use chronicle_delta::{DeltaStore, StateSnapshot};

// Recovery
pub use chronicle_dispatch::{rebuild, RebuildReport};
