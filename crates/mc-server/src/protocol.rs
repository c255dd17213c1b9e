//! Connection states and known protocol versions.

use std::fmt;

/// The five protocol states plus the terminal close marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Configuration,
    Play,
    Close,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Configuration => "configuration",
            Self::Play => "play",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Protocol versions this build knows by name. The wire accepts any version
/// number during the handshake; these are for the status string and for
/// version gating at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1_21_4,
    V1_21_3,
    V1_21_2,
    V1_21_1,
    V1_21,
}

/// The version this server advertises and fully supports.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion::V1_21_4;

impl ProtocolVersion {
    #[must_use]
    pub fn protocol(self) -> i32 {
        match self {
            Self::V1_21_4 => 769,
            Self::V1_21_3 | Self::V1_21_2 => 768,
            Self::V1_21_1 | Self::V1_21 => 767,
        }
    }

    /// Version string in the `1.X.Y` form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::V1_21_4 => "1.21.4",
            Self::V1_21_3 => "1.21.3",
            Self::V1_21_2 => "1.21.2",
            Self::V1_21_1 => "1.21.1",
            Self::V1_21 => "1.21",
        }
    }

    /// The newest named version for a protocol number.
    #[must_use]
    pub fn from_protocol(protocol: i32) -> Option<Self> {
        match protocol {
            769 => Some(Self::V1_21_4),
            768 => Some(Self::V1_21_3),
            767 => Some(Self::V1_21_1),
            _ => None,
        }
    }
}
