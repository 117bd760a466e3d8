//! Network primitives
//!
//! ## Responsibilities
//!
//! - HTTP client tolerant of self-signed camera certificates
//! - RFC 2617 Digest authentication
//! - Minimal raw-TCP RTSP client (OPTIONS, DESCRIBE)
//!
//! All primitives return protocol status codes as ordinary values; only
//! transport failures and parse failures surface as errors.

mod digest;
mod http;
mod rtsp;

pub use digest::{digest_authorization, random_cnonce, DigestChallenge};
pub use http::{HttpClient, HttpResponse, RequestOptions};
pub use rtsp::{rtsp_describe, rtsp_options, RtspResponse, RTSP_PORTS};
