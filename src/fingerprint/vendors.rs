//! Vendor signature registry
//!
//! Pure data: one immutable record per supported vendor. Header patterns are
//! matched first, body patterns second, then the optional existence probes.
//! Endpoint tables feed the device-info lookup, the credential tester and the
//! protocol fuzzer.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Camera vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Hikvision,
    Dahua,
    Axis,
    Reolink,
    Amcrest,
    Foscam,
    #[serde(rename = "tp-link")]
    TpLink,
    Uniview,
    Vivotek,
    Hanwha,
    Bosch,
    Unknown,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Hikvision => "hikvision",
            Vendor::Dahua => "dahua",
            Vendor::Axis => "axis",
            Vendor::Reolink => "reolink",
            Vendor::Amcrest => "amcrest",
            Vendor::Foscam => "foscam",
            Vendor::TpLink => "tp-link",
            Vendor::Uniview => "uniview",
            Vendor::Vivotek => "vivotek",
            Vendor::Hanwha => "hanwha",
            Vendor::Bosch => "bosch",
            Vendor::Unknown => "unknown",
        }
    }
}

impl Default for Vendor {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Static detection and endpoint data for one vendor
#[derive(Debug)]
pub struct VendorSignature {
    pub vendor: Vendor,
    /// Regexes matched case-insensitively against response header values
    pub header_patterns: &'static [&'static str],
    /// Regexes matched case-insensitively against the response body
    pub body_patterns: &'static [&'static str],
    /// Vendor-specific URLs whose existence (2xx/3xx) confirms the vendor
    pub probe_paths: &'static [&'static str],
    /// Endpoints returning model / firmware details
    pub device_info_paths: &'static [&'static str],
    /// RTSP stream paths, most common first
    pub rtsp_paths: &'static [&'static str],
    /// Snapshot endpoints
    pub snapshot_paths: &'static [&'static str],
    /// Login endpoints probed when the root page carries no auth
    pub login_endpoints: &'static [&'static str],
    /// Factory default credentials, highest hit-rate first
    pub default_credentials: &'static [(&'static str, &'static str)],
}

/// All known vendor signatures.
pub static VENDOR_REGISTRY: &[VendorSignature] = &[
    VendorSignature {
        vendor: Vendor::Hikvision,
        header_patterns: &["hikvision", "dnvrs-webs", "dvrdvs-webs", "app-webs"],
        body_patterns: &["hikvision", "/doc/page/login.asp"],
        probe_paths: &["/ISAPI/System/deviceInfo", "/doc/page/login.asp"],
        device_info_paths: &["/ISAPI/System/deviceInfo"],
        rtsp_paths: &[
            "/Streaming/Channels/101",
            "/Streaming/Channels/102",
            "/h264/ch1/main/av_stream",
        ],
        snapshot_paths: &[
            "/ISAPI/Streaming/channels/101/picture",
            "/onvif-http/snapshot",
        ],
        login_endpoints: &["/ISAPI/Security/userCheck"],
        default_credentials: &[
            ("admin", "12345"),
            ("admin", "admin12345"),
            ("admin", "hik12345"),
            ("admin", "hiklinux"),
        ],
    },
    VendorSignature {
        vendor: Vendor::Dahua,
        header_patterns: &["dahua", "dh_web"],
        body_patterns: &["dahua", "dhvideowhmode"],
        probe_paths: &["/cgi-bin/magicBox.cgi?action=getDeviceType"],
        device_info_paths: &[
            "/cgi-bin/magicBox.cgi?action=getDeviceType",
            "/cgi-bin/magicBox.cgi?action=getSoftwareVersion",
        ],
        rtsp_paths: &[
            "/cam/realmonitor?channel=1&subtype=0",
            "/cam/realmonitor?channel=1&subtype=1",
        ],
        snapshot_paths: &["/cgi-bin/snapshot.cgi", "/cgi-bin/snapshot.cgi?channel=1"],
        login_endpoints: &["/RPC2_Login"],
        default_credentials: &[
            ("admin", "admin"),
            ("admin", "888888"),
            ("666666", "666666"),
            ("admin", ""),
        ],
    },
    VendorSignature {
        vendor: Vendor::Axis,
        header_patterns: &["axis"],
        body_patterns: &["axis communications", "axis-cgi"],
        probe_paths: &["/axis-cgi/basicdeviceinfo.cgi"],
        device_info_paths: &[
            "/axis-cgi/basicdeviceinfo.cgi",
            "/axis-cgi/param.cgi?action=list&group=Brand",
        ],
        rtsp_paths: &["/axis-media/media.amp", "/mpeg4/media.amp"],
        snapshot_paths: &["/axis-cgi/jpg/image.cgi"],
        login_endpoints: &[],
        default_credentials: &[("root", "pass"), ("root", "root"), ("admin", "admin")],
    },
    VendorSignature {
        vendor: Vendor::Reolink,
        header_patterns: &["reolink"],
        body_patterns: &["reolink"],
        probe_paths: &["/cgi-bin/api.cgi?cmd=GetDevInfo"],
        device_info_paths: &["/cgi-bin/api.cgi?cmd=GetDevInfo"],
        rtsp_paths: &["/h264Preview_01_main", "/h264Preview_01_sub"],
        snapshot_paths: &["/cgi-bin/api.cgi?cmd=Snap&channel=0"],
        login_endpoints: &["/api.cgi?cmd=Login"],
        default_credentials: &[("admin", "")],
    },
    VendorSignature {
        vendor: Vendor::Amcrest,
        header_patterns: &["amcrest"],
        body_patterns: &["amcrest"],
        probe_paths: &["/cgi-bin/magicBox.cgi?action=getDeviceType"],
        device_info_paths: &["/cgi-bin/magicBox.cgi?action=getDeviceType"],
        rtsp_paths: &["/cam/realmonitor?channel=1&subtype=0"],
        snapshot_paths: &["/cgi-bin/snapshot.cgi"],
        login_endpoints: &["/RPC2_Login"],
        default_credentials: &[("admin", "admin"), ("admin", "password")],
    },
    VendorSignature {
        vendor: Vendor::Foscam,
        header_patterns: &["foscam"],
        body_patterns: &["foscam", "ipcam client"],
        probe_paths: &["/cgi-bin/CGIProxy.fcgi?cmd=getDevInfo"],
        device_info_paths: &["/cgi-bin/CGIProxy.fcgi?cmd=getDevInfo"],
        rtsp_paths: &["/videoMain", "/videoSub"],
        snapshot_paths: &["/cgi-bin/CGIProxy.fcgi?cmd=snapPicture2"],
        login_endpoints: &[],
        default_credentials: &[("admin", ""), ("admin", "foscam")],
    },
    VendorSignature {
        vendor: Vendor::TpLink,
        header_patterns: &["tp-link"],
        body_patterns: &["tp-link", "tapo", "vigi"],
        probe_paths: &[],
        device_info_paths: &[],
        rtsp_paths: &["/stream1", "/stream2", "/h264_stream"],
        snapshot_paths: &[],
        login_endpoints: &[],
        default_credentials: &[("admin", "admin")],
    },
    VendorSignature {
        vendor: Vendor::Uniview,
        header_patterns: &["uniview"],
        body_patterns: &["uniview", "netvu"],
        probe_paths: &["/LAPI/V1.0/System/DeviceInfo"],
        device_info_paths: &["/LAPI/V1.0/System/DeviceInfo"],
        rtsp_paths: &["/media/video1", "/unicast/c1/s0/live"],
        snapshot_paths: &["/images/snapshot.jpg"],
        login_endpoints: &[],
        default_credentials: &[("admin", "123456")],
    },
    VendorSignature {
        vendor: Vendor::Vivotek,
        header_patterns: &["vivotek"],
        body_patterns: &["vivotek"],
        probe_paths: &["/cgi-bin/viewer/getparam.cgi?system_info_modelname"],
        device_info_paths: &["/cgi-bin/viewer/getparam.cgi?system_info_modelname"],
        rtsp_paths: &["/live.sdp", "/live2.sdp"],
        snapshot_paths: &["/cgi-bin/viewer/video.jpg"],
        login_endpoints: &[],
        default_credentials: &[("root", "root")],
    },
    VendorSignature {
        vendor: Vendor::Hanwha,
        header_patterns: &["hanwha", "wisenet"],
        body_patterns: &["hanwha", "wisenet", "samsung techwin"],
        probe_paths: &["/stw-cgi/system.cgi?msubmenu=deviceinfo&action=view"],
        device_info_paths: &["/stw-cgi/system.cgi?msubmenu=deviceinfo&action=view"],
        rtsp_paths: &["/profile2/media.smp", "/profile1/media.smp"],
        snapshot_paths: &["/stw-cgi/video.cgi?msubmenu=snapshot&action=view"],
        login_endpoints: &[],
        default_credentials: &[("admin", "4321"), ("admin", "admin")],
    },
    VendorSignature {
        vendor: Vendor::Bosch,
        header_patterns: &["bosch"],
        body_patterns: &["bosch"],
        probe_paths: &["/rcp.xml?command=0x0aa0&type=P_OCTET&direction=READ"],
        device_info_paths: &["/rcp.xml?command=0x0aa0&type=P_OCTET&direction=READ"],
        rtsp_paths: &["/rtsp_tunnel", "/"],
        snapshot_paths: &["/snap.jpg"],
        login_endpoints: &[],
        default_credentials: &[("service", "service")],
    },
];

/// Signature lookup for a known vendor.
pub fn signature_for(vendor: Vendor) -> Option<&'static VendorSignature> {
    VENDOR_REGISTRY.iter().find(|s| s.vendor == vendor)
}

fn pattern_matches(pattern: &str, text: &str) -> bool {
    Regex::new(&format!("(?i){}", pattern))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Match response headers against the registry, in registry order.
pub fn detect_from_headers<'a, I>(header_values: I) -> Option<Vendor>
where
    I: Iterator<Item = &'a str> + Clone,
{
    for signature in VENDOR_REGISTRY {
        for pattern in signature.header_patterns {
            if header_values.clone().any(|v| pattern_matches(pattern, v)) {
                return Some(signature.vendor);
            }
        }
    }
    None
}

/// Match a response body against the registry, in registry order.
pub fn detect_from_body(body: &str) -> Option<Vendor> {
    for signature in VENDOR_REGISTRY {
        for pattern in signature.body_patterns {
            if pattern_matches(pattern, body) {
                return Some(signature.vendor);
            }
        }
    }
    None
}

/// Infer a vendor from an RTSP server banner.
pub fn detect_from_banner(banner: &str) -> Option<Vendor> {
    for signature in VENDOR_REGISTRY {
        for pattern in signature
            .header_patterns
            .iter()
            .chain(signature.body_patterns.iter())
        {
            if pattern_matches(pattern, banner) {
                return Some(signature.vendor);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vendor_has_a_registry_entry_except_unknown() {
        for vendor in [
            Vendor::Hikvision,
            Vendor::Dahua,
            Vendor::Axis,
            Vendor::Reolink,
            Vendor::Amcrest,
            Vendor::Foscam,
            Vendor::TpLink,
            Vendor::Uniview,
            Vendor::Vivotek,
            Vendor::Hanwha,
            Vendor::Bosch,
        ] {
            assert!(signature_for(vendor).is_some(), "{:?}", vendor);
        }
        assert!(signature_for(Vendor::Unknown).is_none());
    }

    #[test]
    fn header_detection_is_case_insensitive() {
        let values = ["DNVRS-Webs"];
        assert_eq!(
            detect_from_headers(values.iter().copied()),
            Some(Vendor::Hikvision)
        );
        let values = ["App-webs/"];
        assert_eq!(
            detect_from_headers(values.iter().copied()),
            Some(Vendor::Hikvision)
        );
    }

    #[test]
    fn body_detection_finds_dahua() {
        assert_eq!(
            detect_from_body("<html><title>WEB SERVICE</title>var DahuaConfig=1;</html>"),
            Some(Vendor::Dahua)
        );
        assert_eq!(detect_from_body("<html>plain page</html>"), None);
    }

    #[test]
    fn rtsp_banner_detection() {
        assert_eq!(
            detect_from_banner("Dahua Rtsp Server"),
            Some(Vendor::Dahua)
        );
        assert_eq!(
            detect_from_banner("HIKVISION Streaming Media Server"),
            Some(Vendor::Hikvision)
        );
        assert_eq!(detect_from_banner("GStreamer RTSP server"), None);
    }

    #[test]
    fn vendor_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Vendor::TpLink).unwrap(), "\"tp-link\"");
        assert_eq!(serde_json::to_string(&Vendor::Hikvision).unwrap(), "\"hikvision\"");
        let v: Vendor = serde_json::from_str("\"dahua\"").unwrap();
        assert_eq!(v, Vendor::Dahua);
    }
}
