//! TOML settings for the library location and partner setup.
//!
//! ```toml
//! library = "/opt/snap7/lib/libsnap7.so"
//!
//! [partner]
//! active = true
//! local_address = "192.168.0.10"
//! remote_address = "192.168.0.20"
//! local_tsap = 0x1002
//! remote_tsap = 0x1002
//!
//! [partner.params]
//! ping_timeout = 800
//! recv_timeout = 3500
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::{loader, Driver};
use crate::error::{Error, Result};
use crate::params::Parameter;
use crate::partner::Partner;
use crate::translator::Status;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Explicit snap7 library path. Discovery is used when unset.
    pub library: Option<PathBuf>,
    pub partner: PartnerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartnerConfig {
    pub active: bool,
    pub local_address: String,
    pub remote_address: String,
    pub local_tsap: u16,
    pub remote_tsap: u16,
    pub params: ParamOverrides,
}

/// Values applied with [`Partner::set_param`] right after creation. Only
/// parameters a partner may write are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamOverrides {
    pub local_port: Option<u32>,
    pub ping_timeout: Option<u32>,
    pub send_timeout: Option<u32>,
    pub recv_timeout: Option<u32>,
    pub work_interval: Option<u32>,
    pub src_ref: Option<u32>,
    pub dst_ref: Option<u32>,
    pub src_tsap: Option<u32>,
    pub pdu_request: Option<u32>,
    pub bsend_timeout: Option<u32>,
    pub brecv_timeout: Option<u32>,
    pub recovery_time: Option<u32>,
    pub keepalive_time: Option<u32>,
}

impl ParamOverrides {
    /// The overrides that are set, in parameter number order.
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, u32)> + '_ {
        [
            (Parameter::LocalPort, self.local_port),
            (Parameter::PingTimeout, self.ping_timeout),
            (Parameter::SendTimeout, self.send_timeout),
            (Parameter::RecvTimeout, self.recv_timeout),
            (Parameter::WorkInterval, self.work_interval),
            (Parameter::SrcRef, self.src_ref),
            (Parameter::DstRef, self.dst_ref),
            (Parameter::SrcTSap, self.src_tsap),
            (Parameter::PDURequest, self.pdu_request),
            (Parameter::BSendTimeout, self.bsend_timeout),
            (Parameter::BRecvTimeout, self.brecv_timeout),
            (Parameter::RecoveryTime, self.recovery_time),
            (Parameter::KeepAliveTime, self.keepalive_time),
        ]
        .into_iter()
        .filter_map(|(param, value)| value.map(|v| (param, v)))
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("loading settings from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// The native driver, loaded from [`Settings::library`] when set.
    pub fn driver(&self) -> Result<Arc<dyn Driver>> {
        let driver: Arc<dyn Driver> = loader::load_library(self.library.as_deref())?;
        Ok(driver)
    }

    /// A configured partner on the native driver.
    pub fn partner(&self) -> Result<Partner> {
        Partner::from_config(self.driver()?, &self.partner)
    }
}

impl PartnerConfig {
    /// Start `partner` with the configured addresses.
    pub fn connect(&self, partner: &Partner) -> Result<Status> {
        partner.start_to(
            &self.local_address,
            &self.remote_address,
            self.local_tsap,
            self.remote_tsap,
        )
    }
}

impl Partner {
    /// Create a partner and apply every parameter override in `config`.
    pub fn from_config(driver: Arc<dyn Driver>, config: &PartnerConfig) -> Result<Self> {
        let partner = Partner::with_driver(driver, config.active)?;
        for (param, value) in config.params.iter() {
            partner.set_param(param, value)?;
        }
        Ok(partner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use std::io::Write;

    const SAMPLE: &str = r#"
library = "/opt/snap7/libsnap7.so"

[partner]
active = true
local_address = "10.0.0.1"
remote_address = "10.0.0.2"
local_tsap = 0x1002
remote_tsap = 0x1003

[partner.params]
ping_timeout = 800
recv_timeout = 3500
"#;

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.library, Some(PathBuf::from("/opt/snap7/libsnap7.so")));
        assert!(settings.partner.active);
        assert_eq!(settings.partner.remote_tsap, 0x1003);
        let overrides: Vec<_> = settings.partner.params.iter().collect();
        assert_eq!(
            overrides,
            vec![(Parameter::PingTimeout, 800), (Parameter::RecvTimeout, 3500)]
        );
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn test_read_only_param_is_rejected() {
        let err = Settings::from_toml_str("[partner.params]\nremote_port = 1\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("remote_port")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.partner.local_address, "10.0.0.1");

        let again = Settings::from_toml_str(&settings.to_toml_string().unwrap()).unwrap();
        assert_eq!(again, settings);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_config_applies_overrides() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        let driver = Arc::new(MockDriver::new());
        let partner = Partner::from_config(driver, &settings.partner).unwrap();
        assert!(partner.is_active());
        assert_eq!(partner.get_param(Parameter::PingTimeout).unwrap(), 800);
        assert_eq!(partner.get_param(Parameter::RecvTimeout).unwrap(), 3500);
        assert_eq!(partner.get_param(Parameter::SendTimeout).unwrap(), 10);
    }

    #[test]
    fn test_out_of_range_override_fails() {
        let config = PartnerConfig {
            params: ParamOverrides {
                local_port: Some(70_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = Partner::from_config(Arc::new(MockDriver::new()), &config).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter { param: Parameter::LocalPort, .. }
        ));
    }
}
