//! # Network Quality
//!
//! Pure classification of a normalized connectivity tuple into a coarse
//! quality level. Recomputed on every connectivity change, never stored on
//! its own.
//!
//! | connection type | condition            | quality   |
//! |-----------------|----------------------|-----------|
//! | wifi / ethernet |                      | excellent |
//! | cellular        | 5g                   | excellent |
//! | cellular        | 4g                   | good      |
//! | cellular        | 3g                   | fair      |
//! | cellular        | other / unknown      | good      |
//! | bluetooth       |                      | fair      |
//! | vpn             |                      | good      |
//! | other / unknown |                      | fair      |
//! | any             | internet unreachable | offline   |
//! | not connected   |                      | offline   |

use serde::{Deserialize, Serialize};

use crate::sync::network_monitor::{CellularGeneration, ConnectionType, Connectivity};

/// Network quality assessment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    /// Fast, reliable connection
    Excellent,
    /// Good connection
    Good,
    /// Usable but slow
    Fair,
    /// Slow or unreliable connection
    Poor,
    /// No network connection
    Offline,
}

impl NetworkQuality {
    /// Classify a connectivity tuple
    pub fn classify(connectivity: &Connectivity) -> Self {
        if !connectivity.is_connected || connectivity.is_internet_reachable == Some(false) {
            return Self::Offline;
        }

        match connectivity.connection_type {
            ConnectionType::Wifi | ConnectionType::Ethernet => Self::Excellent,
            ConnectionType::Cellular => match connectivity.cellular_generation {
                Some(CellularGeneration::G5) => Self::Excellent,
                Some(CellularGeneration::G4) => Self::Good,
                Some(CellularGeneration::G3) => Self::Fair,
                Some(CellularGeneration::G2) | None => Self::Good,
            },
            ConnectionType::Bluetooth => Self::Fair,
            ConnectionType::Vpn => Self::Good,
            ConnectionType::Other | ConnectionType::Unknown => Self::Fair,
            // Connected with no interface type is contradictory; trust the type
            ConnectionType::None => Self::Offline,
        }
    }
}
