//! External port scanner invocation
//!
//! Shells out to nmap with XML output and parses the result. Only the
//! documented subset of the XML is consumed (host addresses, port ids, port
//! states, service name/product/version), so any conforming scanner can be
//! substituted.

use std::path::PathBuf;
use std::process::Stdio;

use quick_xml::de::from_str;
use serde::Deserialize;
use tokio::process::Command;

use super::{DiscoveredHost, PortState};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    #[serde(rename = "address", default)]
    addresses: Vec<NmapAddress>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@portid")]
    portid: u16,
    state: NmapState,
    #[serde(default)]
    service: Option<NmapService>,
}

#[derive(Debug, Deserialize)]
struct NmapState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct NmapService {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@product", default)]
    product: Option<String>,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

/// Parse scanner XML into discovered hosts, keeping open ports only.
pub fn parse_scan_xml(xml: &str) -> Result<Vec<DiscoveredHost>> {
    let run: NmapRun = from_str(xml).map_err(|e| Error::Scan(format!("scan XML parse: {}", e)))?;
    let mut hosts = Vec::new();

    for host in run.hosts {
        let ip = host
            .addresses
            .iter()
            .find(|a| a.addr_type.as_deref() != Some("mac"))
            .map(|a| a.addr.clone());
        let ip = match ip {
            Some(ip) => ip,
            None => continue,
        };

        let Some(ports) = host.ports else { continue };
        for port in ports.ports {
            if port.state.state != "open" {
                continue;
            }
            let service = port
                .service
                .as_ref()
                .and_then(|s| s.name.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let banner = port
                .service
                .as_ref()
                .map(|s| {
                    [s.product.as_deref(), s.version.as_deref()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            hosts.push(DiscoveredHost {
                ip: ip.clone(),
                port: port.portid,
                service,
                banner,
                state: PortState::Open,
            });
        }
    }

    Ok(hosts)
}

/// Invoke the external scanner for one target and parse its XML output.
pub async fn run_scan(target: &str, ports: &[u16], host_timeout_secs: u64) -> Result<Vec<DiscoveredHost>> {
    let port_list = ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let output_path = scan_output_path();

    let mut cmd = Command::new("nmap");
    cmd.arg("-sV")
        .arg("-p")
        .arg(&port_list)
        .arg("-T4")
        .arg("--open")
        .arg("-oX")
        .arg(&output_path)
        .arg("--host-timeout")
        .arg(format!("{}s", host_timeout_secs))
        .arg(target)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::Scan(format!("failed to launch nmap: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = std::fs::remove_file(&output_path);
        return Err(Error::Scan(format!(
            "nmap exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    let xml = std::fs::read_to_string(&output_path)
        .map_err(|e| Error::Scan(format!("scan output unreadable: {}", e)))?;
    let _ = std::fs::remove_file(&output_path);

    parse_scan_xml(&xml)
}

fn scan_output_path() -> PathBuf {
    std::env::temp_dir().join(format!("camaudit_scan_{}.xml", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<nmaprun>
  <host>
    <status state="up"/>
    <address addr="192.0.2.10" addrtype="ipv4"/>
    <ports>
      <port protocol="tcp" portid="80">
        <state state="open"/>
        <service name="http" product="Hikvision web server" version="3.4"/>
      </port>
      <port protocol="tcp" portid="554">
        <state state="open"/>
        <service name="rtsp" product="Hikvision rtspd"/>
      </port>
      <port protocol="tcp" portid="23">
        <state state="filtered"/>
      </port>
    </ports>
  </host>
  <host>
    <status state="up"/>
    <address addr="192.0.2.11" addrtype="ipv4"/>
    <address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
    <ports>
      <port protocol="tcp" portid="8080">
        <state state="open"/>
      </port>
    </ports>
  </host>
</nmaprun>"#;

    #[test]
    fn extracts_open_ports_with_banners() {
        let hosts = parse_scan_xml(SAMPLE).unwrap();
        assert_eq!(hosts.len(), 3);

        let web = &hosts[0];
        assert_eq!(web.ip, "192.0.2.10");
        assert_eq!(web.port, 80);
        assert_eq!(web.service, "http");
        assert_eq!(web.banner, "Hikvision web server 3.4");

        let rtsp = &hosts[1];
        assert_eq!(rtsp.port, 554);
        assert_eq!(rtsp.banner, "Hikvision rtspd");
    }

    #[test]
    fn filtered_ports_are_dropped() {
        let hosts = parse_scan_xml(SAMPLE).unwrap();
        assert!(hosts.iter().all(|h| h.port != 23));
    }

    #[test]
    fn mac_addresses_are_not_used_as_host_ips() {
        let hosts = parse_scan_xml(SAMPLE).unwrap();
        let second: Vec<_> = hosts.iter().filter(|h| h.port == 8080).collect();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].ip, "192.0.2.11");
        assert_eq!(second[0].service, "unknown");
    }

    #[test]
    fn malformed_xml_is_a_scan_error() {
        assert!(matches!(
            parse_scan_xml("<nmaprun><host></nmaprun>"),
            Err(Error::Scan(_))
        ));
    }
}
