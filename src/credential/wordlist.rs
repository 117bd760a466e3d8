//! Credential list construction
//!
//! Vendor-specific defaults first (highest hit rate), then generic defaults,
//! then caller-supplied custom pairs. Deduplicated by `username:password`,
//! order preserved.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::CustomCredential;
use crate::fingerprint::{signature_for, Vendor};

/// Factory defaults shared across no-name and generic devices.
pub const GENERIC_CREDENTIALS: &[(&str, &str)] = &[
    ("admin", "admin"),
    ("admin", "12345"),
    ("admin", "123456"),
    ("admin", "password"),
    ("admin", ""),
    ("admin", "1234"),
    ("admin", "admin123"),
    ("root", "root"),
    ("root", "admin"),
    ("root", "12345"),
    ("user", "user"),
    ("guest", "guest"),
    ("service", "service"),
    ("supervisor", "supervisor"),
    ("ubnt", "ubnt"),
];

/// Username/password pair; passwords may be empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn key(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

/// Build the ordered, deduplicated credential list for one target.
///
/// For an unknown vendor the generic list already serves as the vendor list,
/// so it is not appended a second time.
pub fn build_credential_list(
    vendor: Vendor,
    custom: &[CustomCredential],
    use_defaults: bool,
) -> Vec<Credential> {
    let mut list = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |credential: Credential| {
        if seen.insert(credential.key()) {
            list.push(credential);
        }
    };

    if use_defaults {
        match signature_for(vendor) {
            Some(signature) => {
                for (user, pass) in signature.default_credentials {
                    push(Credential::new(user, pass));
                }
                for (user, pass) in GENERIC_CREDENTIALS {
                    push(Credential::new(user, pass));
                }
            }
            None => {
                for (user, pass) in GENERIC_CREDENTIALS {
                    push(Credential::new(user, pass));
                }
            }
        }
    }

    for credential in custom {
        push(Credential::new(&credential.username, &credential.password));
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_defaults_come_first() {
        let list = build_credential_list(Vendor::Hikvision, &[], true);
        assert_eq!(list[0], Credential::new("admin", "12345"));
        assert!(list.contains(&Credential::new("admin", "hiklinux")));
        // Generic pairs follow the vendor block.
        let hik_count = signature_for(Vendor::Hikvision)
            .unwrap()
            .default_credentials
            .len();
        assert_eq!(list[hik_count], Credential::new("admin", "admin"));
    }

    #[test]
    fn unknown_vendor_gets_generic_list_once() {
        let list = build_credential_list(Vendor::Unknown, &[], true);
        assert_eq!(list.len(), GENERIC_CREDENTIALS.len());
        assert_eq!(list[0], Credential::new("admin", "admin"));
    }

    #[test]
    fn duplicates_are_removed_preserving_order() {
        // admin:12345 appears in both the Hikvision and the generic list.
        let list = build_credential_list(Vendor::Hikvision, &[], true);
        let count = list
            .iter()
            .filter(|c| c.username == "admin" && c.password == "12345")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn custom_credentials_come_last_and_dedupe() {
        let custom = vec![
            CustomCredential {
                username: "operator".into(),
                password: "opspass".into(),
            },
            CustomCredential {
                username: "admin".into(),
                password: "admin".into(),
            },
        ];
        let list = build_credential_list(Vendor::Unknown, &custom, true);
        assert_eq!(list.last().unwrap(), &Credential::new("operator", "opspass"));
        assert_eq!(
            list.iter().filter(|c| c.key() == "admin:admin").count(),
            1
        );
    }

    #[test]
    fn defaults_can_be_disabled() {
        let custom = vec![CustomCredential {
            username: "only".into(),
            password: "one".into(),
        }];
        let list = build_credential_list(Vendor::Dahua, &custom, false);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], Credential::new("only", "one"));
    }

    #[test]
    fn empty_passwords_are_preserved() {
        let list = build_credential_list(Vendor::Reolink, &[], true);
        assert_eq!(list[0], Credential::new("admin", ""));
    }
}
