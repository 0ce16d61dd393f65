use serde::Serialize;

/// Link state reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PartnerStatus {
    Stopped = 0,
    /// Active partner trying to reach its peer.
    Connecting = 1,
    /// Passive partner waiting for its peer.
    Waiting = 2,
    Linked = 3,
    Sending = 4,
    Receiving = 5,
    BindError = 6,
    /// A value this crate does not know about.
    Unknown = -1,
}

impl PartnerStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PartnerStatus::Stopped,
            1 => PartnerStatus::Connecting,
            2 => PartnerStatus::Waiting,
            3 => PartnerStatus::Linked,
            4 => PartnerStatus::Sending,
            5 => PartnerStatus::Receiving,
            6 => PartnerStatus::BindError,
            _ => PartnerStatus::Unknown,
        }
    }

    /// Linked, or busy transferring over the link.
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            PartnerStatus::Linked | PartnerStatus::Sending | PartnerStatus::Receiving
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartnerStats {
    pub bytes_sent: u32,
    pub bytes_recv: u32,
    pub send_errors: u32,
    pub recv_errors: u32,
}

/// Duration of the last transfers, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartnerTimes {
    pub send_time: u32,
    pub recv_time: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(PartnerStatus::from_raw(3), PartnerStatus::Linked);
        assert_eq!(PartnerStatus::from_raw(6), PartnerStatus::BindError);
        assert_eq!(PartnerStatus::from_raw(42), PartnerStatus::Unknown);
        for status in [PartnerStatus::Stopped, PartnerStatus::Waiting, PartnerStatus::Sending] {
            assert_eq!(PartnerStatus::from_raw(status as i32), status);
        }
    }

    #[test]
    fn test_is_linked() {
        for status in [PartnerStatus::Linked, PartnerStatus::Sending, PartnerStatus::Receiving] {
            assert!(status.is_linked());
        }
        for status in [
            PartnerStatus::Stopped,
            PartnerStatus::Connecting,
            PartnerStatus::Waiting,
            PartnerStatus::BindError,
            PartnerStatus::Unknown,
        ] {
            assert!(!status.is_linked());
        }
    }

    #[test]
    fn test_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&PartnerStatus::BindError).unwrap(),
            "\"bind_error\""
        );
        let stats = PartnerStats {
            bytes_sent: 5,
            ..Default::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["bytes_sent"], 5);
        assert_eq!(json["recv_errors"], 0);
    }
}
