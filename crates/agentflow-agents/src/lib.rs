//! # Agentflow Agents
//!
//! The agent contract and the concrete agent kinds.
//!
//! ## Contract
//!
//! ```text
//! check(memory, now)             -> Outcome { memory', emitted }
//! receive(memory, messages, now) -> Outcome { memory', emitted }
//! ```
//!
//! Memory goes in by value and comes back in the [`Outcome`]; the runtime
//! persists it only when the invocation succeeds.
//!
//! ## Kinds
//!
//! - **attribute_difference**: delta / ratio of a field against its previous value
//! - **peak_detector**: per-group rolling window with debounced peak detection
//! - **feed_poller**: scheduled polling of a [`FeedSource`] with a memory cursor

pub mod agent;
pub mod attribute_difference;
pub mod feed_poller;
pub mod kinds;
pub mod options;
pub mod peak_detector;
pub mod schedule;

pub use agent::{Agent, AgentStatus, Outcome};
pub use attribute_difference::{AttributeDifferenceAgent, AttributeDifferenceOptions, DifferenceMethod};
pub use feed_poller::{FeedPollerAgent, FeedPollerOptions, FeedSource};
pub use kinds::{AgentFactory, AgentKind, AgentOptions, AnyAgent};
pub use options::LenientNumber;
pub use peak_detector::{Detection, PeakDetectorAgent, PeakDetectorOptions, PeakRecord, Sample};
pub use schedule::Schedule;
