//! Generic endpoint lists for protocol fuzzing
//!
//! Vendor-specific paths come from the vendor registry; these lists cover the
//! long tail of white-label firmware.

/// RTSP stream paths seen across generic camera firmware.
pub const GENERIC_RTSP_PATHS: &[&str] = &[
    "/live",
    "/live/main",
    "/live/ch00_0",
    "/stream",
    "/stream1",
    "/stream2",
    "/main",
    "/media/video1",
    "/11",
    "/12",
    "/h264",
    "/live.sdp",
    "/av0_0",
    "/ch0.h264",
    "/user=admin_password=_channel=1_stream=0.sdp",
];

/// Snapshot endpoints answered by generic firmware.
pub const GENERIC_SNAPSHOT_PATHS: &[&str] = &[
    "/snapshot.jpg",
    "/snap.jpg",
    "/image.jpg",
    "/jpg/image.jpg",
    "/tmpfs/auto.jpg",
    "/cgi-bin/snapshot.cgi",
    "/snapshot.cgi",
    "/image/jpeg.cgi",
    "/oneshotimage.jpg",
    "/getimage.cgi",
];

/// Paths that leak configuration or credentials when left unprotected.
pub const CONFIG_DISCLOSURE_PATHS: &[&str] = &[
    "/config.xml",
    "/configuration.xml",
    "/system.xml",
    "/params.xml",
    "/setup.xml",
    "/.env",
    "/config/config.ini",
    "/cgi-bin/config.cgi",
    "/system.ini?loginuse&loginpas=",
];

/// Admin and debug surfaces that should not answer unauthenticated.
pub const ADMIN_ENDPOINTS: &[&str] = &[
    "/admin",
    "/admin.html",
    "/setup.html",
    "/config.html",
    "/system.html",
    "/maintenance.html",
    "/debug",
    "/status.html",
    "/cgi-bin/admin.cgi",
    "/web/admin.html",
];
