use serde::{Deserialize, Serialize};

/// Where the update server lives, resolved once at the call boundary.
///
/// Both addressing styles carry an optional TLS peer-fingerprint pin.
/// Enforcement of the pin belongs to the transport implementation; the
/// locator only transports the value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateLocator {
    /// A fully formed URL.
    Url {
        url: String,
        #[serde(default)]
        fingerprint: Option<String>,
    },
    /// Host, port and path components joined by the transport.
    HostPath {
        host: String,
        port: u16,
        path: String,
        #[serde(default)]
        fingerprint: Option<String>,
    },
}

impl UpdateLocator {
    /// Locator from a fully formed URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            fingerprint: None,
        }
    }

    /// Locator from host, port and path components.
    pub fn from_host(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self::HostPath {
            host: host.into(),
            port,
            path: path.into(),
            fingerprint: None,
        }
    }

    /// Attach a TLS peer-fingerprint pin.
    pub fn with_fingerprint(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Url { fingerprint, .. } | Self::HostPath { fingerprint, .. } => {
                *fingerprint = Some(value.into());
            }
        }
        self
    }

    /// URL the transport will request.
    pub fn resolve(&self) -> String {
        match self {
            Self::Url { url, .. } => url.clone(),
            Self::HostPath {
                host, port, path, ..
            } => {
                let slash = if path.starts_with('/') { "" } else { "/" };
                format!("http://{host}:{port}{slash}{path}")
            }
        }
    }

    /// Optional TLS peer-fingerprint pin.
    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Self::Url { fingerprint, .. } | Self::HostPath { fingerprint, .. } => {
                fingerprint.as_deref()
            }
        }
    }
}

/// Identity and capacity facts reported to the update server, which uses them
/// to decide whether (and which) payload to serve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProfile {
    /// MAC-like unique device identifier.
    pub device_id: String,
    /// Version of the currently running firmware image.
    pub firmware_version: String,
    /// Version of the currently installed dataset image.
    pub dataset_version: String,
    /// Total flash capacity in bytes.
    pub flash_capacity: u64,
    /// Free update-storage space in bytes.
    pub free_update_space: u64,
}

/// Everything one update attempt needs to know about its target and itself.
///
/// Immutable once constructed; the caller owns it and lends it to the
/// orchestrator for the duration of a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRequest {
    pub locator: UpdateLocator,
    pub device: DeviceProfile,
}

impl UpdateRequest {
    pub fn new(locator: UpdateLocator, device: DeviceProfile) -> Self {
        Self { locator, device }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_path_locator_resolves_to_url() {
        let locator = UpdateLocator::from_host("updates.example", 8266, "/check");
        assert_eq!(locator.resolve(), "http://updates.example:8266/check");
    }

    #[test]
    fn host_path_locator_inserts_missing_slash() {
        let locator = UpdateLocator::from_host("updates.example", 80, "check");
        assert_eq!(locator.resolve(), "http://updates.example:80/check");
    }

    #[test]
    fn url_locator_resolves_verbatim() {
        let locator = UpdateLocator::from_url("https://updates.example/fw?channel=beta");
        assert_eq!(locator.resolve(), "https://updates.example/fw?channel=beta");
    }

    #[test]
    fn fingerprint_attaches_to_either_style() {
        let pinned = UpdateLocator::from_url("https://updates.example/fw")
            .with_fingerprint("aa:bb:cc:dd");
        assert_eq!(pinned.fingerprint(), Some("aa:bb:cc:dd"));

        let bare = UpdateLocator::from_host("updates.example", 443, "/fw");
        assert_eq!(bare.fingerprint(), None);
    }
}
