//! Property-based tests for network quality classification

use proptest::prelude::*;
use zaptap_sync::sync::{CellularGeneration, ConnectionType, Connectivity, NetworkQuality};

fn connection_type() -> impl Strategy<Value = ConnectionType> {
    prop_oneof![
        Just(ConnectionType::Wifi),
        Just(ConnectionType::Ethernet),
        Just(ConnectionType::Cellular),
        Just(ConnectionType::Bluetooth),
        Just(ConnectionType::Vpn),
        Just(ConnectionType::Other),
        Just(ConnectionType::Unknown),
        Just(ConnectionType::None),
    ]
}

fn generation() -> impl Strategy<Value = Option<CellularGeneration>> {
    prop::option::of(prop_oneof![
        Just(CellularGeneration::G2),
        Just(CellularGeneration::G3),
        Just(CellularGeneration::G4),
        Just(CellularGeneration::G5),
    ])
}

proptest! {
    #[test]
    fn test_unreachable_is_always_offline(
        is_connected in any::<bool>(),
        connection_type in connection_type(),
        cellular_generation in generation(),
    ) {
        let connectivity = Connectivity {
            is_connected,
            is_internet_reachable: Some(false),
            connection_type,
            cellular_generation,
        };
        prop_assert_eq!(NetworkQuality::classify(&connectivity), NetworkQuality::Offline);
        prop_assert!(!connectivity.is_online());
    }

    #[test]
    fn test_disconnected_is_always_offline(
        reachable in prop::option::of(any::<bool>()),
        connection_type in connection_type(),
        cellular_generation in generation(),
    ) {
        let connectivity = Connectivity {
            is_connected: false,
            is_internet_reachable: reachable,
            connection_type,
            cellular_generation,
        };
        prop_assert_eq!(NetworkQuality::classify(&connectivity), NetworkQuality::Offline);
    }

    #[test]
    fn test_connected_interface_is_never_offline(
        reachable in prop::option::of(Just(true)),
        connection_type in connection_type().prop_filter("has interface", |t| *t != ConnectionType::None),
        cellular_generation in generation(),
    ) {
        let connectivity = Connectivity {
            is_connected: true,
            is_internet_reachable: reachable,
            connection_type,
            cellular_generation,
        };
        prop_assert_ne!(NetworkQuality::classify(&connectivity), NetworkQuality::Offline);
    }
}
