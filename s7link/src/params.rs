//! Parameter registry: the configurable integer settings, their native width
//! and which roles may read or write them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::translator::Role;

/// Parameter keys, numbered as the driver numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Parameter {
    LocalPort = 1,
    RemotePort = 2,
    PingTimeout = 3,
    SendTimeout = 4,
    RecvTimeout = 5,
    WorkInterval = 6,
    SrcRef = 7,
    DstRef = 8,
    SrcTSap = 9,
    PDURequest = 10,
    MaxClients = 11,
    BSendTimeout = 12,
    BRecvTimeout = 13,
    RecoveryTime = 14,
    KeepAliveTime = 15,
}

/// Native storage width of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U16,
    I32,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
    Unsupported,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadOnly)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::ReadWrite | Access::WriteOnly)
    }
}

impl Parameter {
    pub const ALL: [Parameter; 15] = [
        Parameter::LocalPort,
        Parameter::RemotePort,
        Parameter::PingTimeout,
        Parameter::SendTimeout,
        Parameter::RecvTimeout,
        Parameter::WorkInterval,
        Parameter::SrcRef,
        Parameter::DstRef,
        Parameter::SrcTSap,
        Parameter::PDURequest,
        Parameter::MaxClients,
        Parameter::BSendTimeout,
        Parameter::BRecvTimeout,
        Parameter::RecoveryTime,
        Parameter::KeepAliveTime,
    ];

    pub fn number(self) -> i32 {
        self as i32
    }

    pub fn from_number(number: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.number() == number)
    }

    pub fn width(self) -> Width {
        use Parameter::*;
        match self {
            LocalPort | RemotePort | SrcRef | DstRef | SrcTSap => Width::U16,
            PingTimeout | SendTimeout | RecvTimeout | WorkInterval | PDURequest | MaxClients
            | BSendTimeout | BRecvTimeout => Width::I32,
            RecoveryTime | KeepAliveTime => Width::U32,
        }
    }

    /// Largest value the parameter's native width can hold.
    pub fn max_value(self) -> u32 {
        match self.width() {
            Width::U16 => u32::from(u16::MAX),
            Width::I32 => i32::MAX as u32,
            Width::U32 => u32::MAX,
        }
    }

    pub fn access(self, role: Role) -> Access {
        use Parameter::*;
        match role {
            Role::Partner => match self {
                RemotePort => Access::ReadOnly,
                SrcTSap => Access::WriteOnly,
                MaxClients => Access::Unsupported,
                _ => Access::ReadWrite,
            },
            Role::Client => match self {
                RemotePort | PingTimeout | SendTimeout | RecvTimeout | SrcRef | DstRef
                | SrcTSap | PDURequest => Access::ReadWrite,
                _ => Access::Unsupported,
            },
            Role::Server => match self {
                LocalPort | WorkInterval | PDURequest | MaxClients => Access::ReadWrite,
                _ => Access::Unsupported,
            },
        }
    }

    pub(crate) fn check_readable(self, role: Role) -> Result<()> {
        if self.access(role).can_read() {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                param: self,
                reason: "not readable for this role",
            })
        }
    }

    pub(crate) fn check_writable(self, role: Role) -> Result<()> {
        if self.access(role).can_write() {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                param: self,
                reason: "not writable for this role",
            })
        }
    }
}

/// A parameter value in its native width, as exchanged with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValue {
    U16(u16),
    I32(i32),
    U32(u32),
}

impl ParamValue {
    pub fn zeroed(width: Width) -> Self {
        match width {
            Width::U16 => ParamValue::U16(0),
            Width::I32 => ParamValue::I32(0),
            Width::U32 => ParamValue::U32(0),
        }
    }

    /// Encode `value` in the width of `param`, rejecting values outside the
    /// parameter's domain.
    pub fn encode(param: Parameter, value: u32) -> Result<Self> {
        let out_of_range = || Error::InvalidParameter {
            param,
            reason: "value out of range",
        };
        if value > param.max_value() {
            return Err(out_of_range());
        }
        Ok(match param.width() {
            Width::U16 => ParamValue::U16(value as u16),
            Width::I32 => ParamValue::I32(value as i32),
            Width::U32 => ParamValue::U32(value),
        })
    }

    /// The value as a non-negative integer. `None` for a negative `I32`.
    pub fn to_u32(self) -> Option<u32> {
        match self {
            ParamValue::U16(v) => Some(u32::from(v)),
            ParamValue::I32(v) => u32::try_from(v).ok(),
            ParamValue::U32(v) => Some(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_round_trip() {
        for param in Parameter::ALL {
            assert_eq!(Parameter::from_number(param.number()), Some(param));
        }
        assert_eq!(Parameter::from_number(0), None);
        assert_eq!(Parameter::from_number(16), None);
        assert_eq!(Parameter::PingTimeout.number(), 3);
        assert_eq!(Parameter::KeepAliveTime.number(), 15);
    }

    #[test]
    fn test_partner_access() {
        let role = Role::Partner;
        assert_eq!(Parameter::RemotePort.access(role), Access::ReadOnly);
        assert_eq!(Parameter::SrcTSap.access(role), Access::WriteOnly);
        assert_eq!(Parameter::MaxClients.access(role), Access::Unsupported);
        assert_eq!(Parameter::PingTimeout.access(role), Access::ReadWrite);
        assert!(Parameter::MaxClients.check_readable(role).is_err());
        assert!(Parameter::RemotePort.check_writable(role).is_err());
        assert!(Parameter::RemotePort.check_readable(role).is_ok());
        assert!(Parameter::SrcTSap.check_readable(role).is_err());
    }

    #[test]
    fn test_other_roles() {
        assert!(Parameter::MaxClients.access(Role::Server).can_read());
        assert!(!Parameter::MaxClients.access(Role::Client).can_read());
        assert!(Parameter::RemotePort.access(Role::Client).can_write());
        assert!(!Parameter::KeepAliveTime.access(Role::Server).can_write());
    }

    #[test]
    fn test_encode_respects_width() {
        assert_eq!(
            ParamValue::encode(Parameter::LocalPort, 102).unwrap(),
            ParamValue::U16(102)
        );
        assert!(matches!(
            ParamValue::encode(Parameter::LocalPort, 70_000),
            Err(Error::InvalidParameter { param: Parameter::LocalPort, .. })
        ));
        assert!(ParamValue::encode(Parameter::PingTimeout, u32::MAX).is_err());
        assert_eq!(
            ParamValue::encode(Parameter::RecoveryTime, u32::MAX).unwrap(),
            ParamValue::U32(u32::MAX)
        );
        assert_eq!(Parameter::SrcRef.max_value(), 65_535);
    }

    #[test]
    fn test_encode_accepts_up_to_max_value() {
        for param in Parameter::ALL {
            let max = param.max_value();
            let encoded = ParamValue::encode(param, max).unwrap();
            assert_eq!(encoded.to_u32(), Some(max), "{param:?}");
            if let Some(over) = max.checked_add(1) {
                assert!(ParamValue::encode(param, over).is_err(), "{param:?}");
            }
        }
    }

    #[test]
    fn test_negative_i32_has_no_u32() {
        assert_eq!(ParamValue::I32(-1).to_u32(), None);
        assert_eq!(ParamValue::I32(750).to_u32(), Some(750));
        assert_eq!(ParamValue::zeroed(Width::U32), ParamValue::U32(0));
    }
}
