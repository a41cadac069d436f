//! c2-hunt: weak-signal hunting for command-and-control traffic.
//!
//! Analyzes flow logs and DNS query logs for behaviour typical of C2
//! channels: periodic beaconing, flows far more regular than their host's
//! usual traffic, and repeatedly queried high-entropy domains. Each finding
//! is a weak signal; signals are fused into a bounded risk score.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌──────────┐   ┌────────────┐   ┌─────────┐
//! │ ingest  │──>│   flow    │──>│ baseline │──>│ regularity │──>│ scoring │
//! │  (csv)  │   │ (series)  │   │ (phase 1)│   │  (phase 2) │   │ (fusion)│
//! └─────────┘   └───────────┘   └──────────┘   └────────────┘   └─────────┘
//!      │              └──> analyzer (intervals, statistics) ──────┘
//!      └──> dns_detector (entropy) ───────────────────────────────┘
//! ```
//!
//! This is a hunting aid, not a verdict engine.

pub mod analyzer;
pub mod baseline;
pub mod config;
pub mod dns_detector;
pub mod error;
pub mod export;
pub mod flow;
pub mod ingest;
pub mod ioc;
pub mod pipeline;
pub mod regularity;
pub mod scoring;
