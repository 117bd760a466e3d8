//! Camaudit Library
//!
//! Automated security assessor for IP cameras and camera-adjacent devices.
//!
//! ## Architecture (9 Components)
//!
//! 1. Net - HTTP/Digest/RTSP network primitives
//! 2. Exec - bounded parallelism, rate limiting, session mutex
//! 3. Audit - per-module event logs, workflow log, session metrics
//! 4. Discovery - external scanner plus TCP-connect fallback
//! 5. Fingerprint - vendor/model/firmware/auth identification
//! 6. Credential - default-credential testing with baseline validation
//! 7. Cve - static vulnerability check registry
//! 8. Fuzzer - RTSP/snapshot/config/admin exposure probing
//! 9. Workflow - durable orchestration with retry and heartbeat
//!
//! ## Design Principles
//!
//! - One session, one directory: every artifact lives under the session dir
//! - Activities are idempotent and restartable
//! - Network status codes are values, only transport failures raise

pub mod audit;
pub mod config;
pub mod credential;
pub mod cve;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod fingerprint;
pub mod fuzzer;
pub mod net;
pub mod workflow;

pub use error::{Error, Result};
