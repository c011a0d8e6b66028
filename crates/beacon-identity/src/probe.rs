//! Device metadata probes.

use async_trait::async_trait;
use beacon_protocol::{DeviceInfo, DeviceProbe};
use sha2::{Digest, Sha256};

/// Stable digest over the visible device fields, for coarse repeat-visitor
/// counting without any identity.
pub fn fingerprint(info: &DeviceInfo) -> String {
    let mut hasher = Sha256::new();
    for field in [
        info.user_agent.as_deref(),
        info.platform.as_deref(),
        info.language.as_deref(),
        info.timezone.as_deref(),
    ] {
        hasher.update(field.unwrap_or_default().as_bytes());
        hasher.update([0]);
    }
    hasher.update(info.viewport_width.unwrap_or_default().to_le_bytes());
    hasher.update(info.viewport_height.unwrap_or_default().to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Probe that yields nothing; creates go out without metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceProbe;

#[async_trait]
impl DeviceProbe for NoDeviceProbe {
    async fn probe(&self) -> Option<DeviceInfo> {
        None
    }
}

/// Probe over metadata the host gathered at attach time. Fills in the
/// fingerprint digest if the host left it empty.
#[derive(Debug, Clone)]
pub struct StaticDeviceProbe {
    info: DeviceInfo,
}

impl StaticDeviceProbe {
    pub fn new(mut info: DeviceInfo) -> Self {
        if info.fingerprint.is_none() {
            info.fingerprint = Some(fingerprint(&info));
        }
        Self { info }
    }
}

#[async_trait]
impl DeviceProbe for StaticDeviceProbe {
    async fn probe(&self) -> Option<DeviceInfo> {
        Some(self.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_field_sensitive() {
        let a = DeviceInfo {
            user_agent: Some("Mozilla/5.0".into()),
            language: Some("en-GB".into()),
            ..DeviceInfo::default()
        };
        let b = DeviceInfo {
            user_agent: Some("Mozilla/5.0".into()),
            language: Some("en-US".into()),
            ..DeviceInfo::default()
        };
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn static_probe_fills_fingerprint() {
        let probe = StaticDeviceProbe::new(DeviceInfo {
            user_agent: Some("Mozilla/5.0".into()),
            ..DeviceInfo::default()
        });
        let info = probe.probe().await.unwrap();
        assert!(info.fingerprint.is_some());
    }
}
