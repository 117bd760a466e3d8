//! ONVIF device probing
//!
//! Unauthenticated `GetDeviceInformation` to spot ONVIF-capable devices, and
//! a WS-Security UsernameToken variant used by the credential tester.

use std::time::Duration;

use base64::Engine;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::net::{HttpClient, HttpResponse, RequestOptions};

/// ONVIF SOAP calls get a short deadline; cameras answer quickly or not at all.
pub const ONVIF_TIMEOUT: Duration = Duration::from_secs(5);

const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";
const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

fn device_information_envelope(security_header: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>{}</s:Header>
  <s:Body><GetDeviceInformation xmlns="http://www.onvif.org/ver10/device/wsdl"/></s:Body>
</s:Envelope>"#,
        security_header
    )
}

/// WS-Security UsernameToken header: PasswordDigest = Base64(SHA1(nonce + created + password)).
pub fn ws_security_header(username: &str, password: &str) -> String {
    let nonce_bytes: [u8; 16] = rand::thread_rng().gen();
    let nonce_b64 = base64::engine::general_purpose::STANDARD.encode(nonce_bytes);
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut hasher = Sha1::new();
    hasher.update(nonce_bytes);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest_b64 = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

    format!(
        r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><wsse:UsernameToken><wsse:Username>{}</wsse:Username><wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</wsse:Password><wsse:Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</wsse:Nonce><wsu:Created>{}</wsu:Created></wsse:UsernameToken></wsse:Security>"#,
        username, digest_b64, nonce_b64, created
    )
}

/// Whether a device-service response indicates ONVIF support.
///
/// A 401 counts: the device knows the endpoint but wants credentials.
pub fn indicates_onvif(response: &HttpResponse) -> bool {
    if response.status == 401 {
        return true;
    }
    let lower = response.body.to_ascii_lowercase();
    lower.contains("onvif") || lower.contains("getdeviceinformationresponse")
}

/// Unauthenticated ONVIF probe against one host port.
pub async fn probe_onvif(client: &HttpClient, scheme: &str, ip: &str, port: u16) -> bool {
    let url = format!("{}://{}:{}{}", scheme, ip, port, DEVICE_SERVICE_PATH);
    let options = RequestOptions {
        timeout: Some(ONVIF_TIMEOUT),
        content_type: Some(SOAP_CONTENT_TYPE.to_string()),
        ..RequestOptions::default()
    };
    match client
        .request("POST", &url, Some(device_information_envelope("")), &options)
        .await
    {
        Ok(response) => indicates_onvif(&response),
        Err(_) => false,
    }
}

/// Authenticated `GetDeviceInformation`; returns the response body on a reply
/// that is not an auth rejection.
pub async fn get_device_information(
    client: &HttpClient,
    scheme: &str,
    ip: &str,
    port: u16,
    username: &str,
    password: &str,
) -> Option<HttpResponse> {
    let url = format!("{}://{}:{}{}", scheme, ip, port, DEVICE_SERVICE_PATH);
    let envelope = device_information_envelope(&ws_security_header(username, password));
    let options = RequestOptions {
        timeout: Some(ONVIF_TIMEOUT),
        content_type: Some(SOAP_CONTENT_TYPE.to_string()),
        ..RequestOptions::default()
    };
    client.request("POST", &url, Some(envelope), &options).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn soap_response_counts_as_onvif() {
        assert!(indicates_onvif(&response(
            200,
            "<s:Envelope><GetDeviceInformationResponse/></s:Envelope>"
        )));
        assert!(indicates_onvif(&response(
            500,
            "<s:Envelope xmlns:tds=\"http://www.onvif.org/ver10/device/wsdl\"/>"
        )));
    }

    #[test]
    fn unauthorized_counts_as_onvif() {
        assert!(indicates_onvif(&response(401, "")));
    }

    #[test]
    fn plain_html_does_not_count() {
        assert!(!indicates_onvif(&response(200, "<html>login</html>")));
        assert!(!indicates_onvif(&response(404, "not found")));
    }

    #[test]
    fn ws_security_header_carries_token_fields() {
        let header = ws_security_header("admin", "secret");
        assert!(header.contains("<wsse:Username>admin</wsse:Username>"));
        assert!(header.contains("PasswordDigest"));
        assert!(header.contains("<wsse:Nonce"));
        assert!(header.contains("<wsu:Created>"));
    }
}
