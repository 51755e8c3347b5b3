#![doc = include_str!("../README.md")]
//!
//! # 데이터 흐름
//! ```text
//! kernel NFQUEUE ──▶ PacketSource::next ──▶ VerdictEngine::handle ──┬─▶ AccessLedger
//!                                                                   ├─▶ mpsc::Sender<AccessEvent> (→ sink)
//!                                                                   └─▶ PacketSource::verdict
//! ```

pub mod engine;
pub mod ledger;
pub mod monitor;
pub mod parser;
pub mod source;

// --- 주요 타입 re-export ---

pub use engine::VerdictEngine;
pub use ledger::AccessLedger;
pub use monitor::{CaptureMonitor, CaptureMonitorBuilder};
pub use parser::parse_header;
pub use source::{NfqueueSource, PacketSource};
