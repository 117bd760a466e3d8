//! Minimal RTSP client over raw TCP
//!
//! OPTIONS and DESCRIBE only, enough to probe camera streams. The status
//! line of the response is parsed; everything else is carried raw. A status
//! code of 0 signals an unparseable response.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Ports treated as RTSP-primary during fingerprinting and fuzzing.
pub const RTSP_PORTS: &[u16] = &[554, 8554, 8555, 10554];

/// Overall deadline for an RTSP exchange.
const RTSP_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace interval for the SDP body to arrive after the header block.
const SDP_BODY_WAIT: Duration = Duration::from_millis(150);

/// Parsed RTSP response
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// Status code from `RTSP/x.y NNN`; 0 when the reply is unparseable
    pub status_code: u16,
    /// Lowercased header map from the header block
    pub headers: HashMap<String, String>,
    /// Full raw response, headers and any SDP body
    pub raw: String,
}

impl RtspResponse {
    fn parse(raw: String) -> Self {
        let mut status_code = 0;
        let mut headers = HashMap::new();

        let mut lines = raw.split("\r\n");
        if let Some(status_line) = lines.next() {
            let mut parts = status_line.split_whitespace();
            if parts
                .next()
                .map(|v| v.starts_with("RTSP/"))
                .unwrap_or(false)
            {
                if let Some(code) = parts.next().and_then(|c| c.parse::<u16>().ok()) {
                    status_code = code;
                }
            }
        }
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Self {
            status_code,
            headers,
            raw,
        }
    }
}

fn basic_header(auth: Option<(&str, &str)>) -> String {
    match auth {
        Some((user, pass)) => {
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", user, pass));
            format!("Authorization: Basic {}\r\n", encoded)
        }
        None => String::new(),
    }
}

/// Send an RTSP OPTIONS request.
pub async fn rtsp_options(
    ip: IpAddr,
    port: u16,
    auth: Option<(&str, &str)>,
) -> Result<RtspResponse> {
    let request = format!(
        "OPTIONS rtsp://{}:{} RTSP/1.0\r\nCSeq: 1\r\n{}User-Agent: camaudit/0.3\r\n\r\n",
        ip,
        port,
        basic_header(auth)
    );
    exchange(ip, port, &request, false).await
}

/// Send an RTSP DESCRIBE for a stream path.
pub async fn rtsp_describe(
    ip: IpAddr,
    port: u16,
    path: &str,
    auth: Option<(&str, &str)>,
) -> Result<RtspResponse> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let request = format!(
        "DESCRIBE rtsp://{}:{}{} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n{}User-Agent: camaudit/0.3\r\n\r\n",
        ip,
        port,
        path,
        basic_header(auth)
    );
    exchange(ip, port, &request, true).await
}

/// Run one request/response exchange. The stream is dropped on every exit
/// path; callers observe exactly one settlement.
async fn exchange(ip: IpAddr, port: u16, request: &str, await_body: bool) -> Result<RtspResponse> {
    let addr = (ip, port);
    let mut stream = match timeout(RTSP_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(Error::Network(format!("rtsp connect {}:{}: {}", ip, port, e))),
        Err(_) => return Err(Error::Timeout(format!("rtsp connect {}:{}", ip, port))),
    };

    match timeout(RTSP_TIMEOUT, stream.write_all(request.as_bytes())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(Error::Network(format!("rtsp write {}:{}: {}", ip, port, e))),
        Err(_) => return Err(Error::Timeout(format!("rtsp write {}:{}", ip, port))),
    }

    let mut buf = Vec::with_capacity(2048);
    let mut chunk = [0u8; 2048];

    // Read until the end of the header block.
    let header_deadline = tokio::time::Instant::now() + RTSP_TIMEOUT;
    loop {
        if find_header_end(&buf).is_some() {
            break;
        }
        let remaining = header_deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_default();
        if remaining.is_zero() {
            if buf.is_empty() {
                return Err(Error::Timeout(format!("rtsp read {}:{}", ip, port)));
            }
            break;
        }
        match timeout(remaining, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                if buf.is_empty() {
                    return Err(Error::Network(format!("rtsp read {}:{}: {}", ip, port, e)));
                }
                break;
            }
            Err(_) => {
                if buf.is_empty() {
                    return Err(Error::Timeout(format!("rtsp read {}:{}", ip, port)));
                }
                break;
            }
        }
    }

    // DESCRIBE replies may trail an SDP body shortly after the headers.
    if await_body && find_header_end(&buf).is_some() {
        loop {
            match timeout(SDP_BODY_WAIT, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                _ => break,
            }
        }
    }

    Ok(RtspResponse::parse(String::from_utf8_lossy(&buf).into_owned()))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_status_line_and_headers() {
        let response = RtspResponse::parse(
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nServer: Dahua Rtsp Server\r\nPublic: OPTIONS, DESCRIBE\r\n\r\n"
                .to_string(),
        );
        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers.get("server").unwrap(), "Dahua Rtsp Server");
        assert_eq!(response.headers.get("cseq").unwrap(), "1");
    }

    #[test]
    fn parses_unauthorized() {
        let response = RtspResponse::parse(
            "RTSP/1.0 401 Unauthorized\r\nCSeq: 2\r\nWWW-Authenticate: Basic realm=\"cam\"\r\n\r\n"
                .to_string(),
        );
        assert_eq!(response.status_code, 401);
    }

    #[test]
    fn garbage_yields_code_zero() {
        let response = RtspResponse::parse("HTTP/1.1 200 OK\r\n\r\n".to_string());
        assert_eq!(response.status_code, 0);
        let response = RtspResponse::parse("not a response at all".to_string());
        assert_eq!(response.status_code, 0);
    }

    #[test]
    fn body_is_kept_raw() {
        let response = RtspResponse::parse(
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Type: application/sdp\r\n\r\nv=0\r\no=- 0 0 IN IP4 0.0.0.0\r\n"
                .to_string(),
        );
        assert_eq!(response.status_code, 200);
        assert!(response.raw.contains("v=0"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let result = rtsp_options(ip, 554, None).await;
        assert!(matches!(
            result,
            Err(Error::Network(_)) | Err(Error::Timeout(_))
        ));
    }
}
