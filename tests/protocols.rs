use qkd_netsim::errors::{ConfigError, NetworkError, ProtocolError};
use qkd_netsim::{PartyId, ProtocolConfig, ProtocolVariant, QkdProtocol, QubitCounts};

fn keys_match(protocol: &QkdProtocol, a: usize, b: usize) -> Vec<u8> {
    let ab = protocol.party(a).unwrap().secret_key(PartyId(b));
    let ba = protocol.party(b).unwrap().secret_key(PartyId(a));
    assert_eq!(ab, ba, "keys between {a} and {b} differ");
    ab
}

#[test]
fn bb84_without_eavesdropper_stays_secure() {
    let config = ProtocolConfig::default().with_check_bit_prob(0.2).with_seed(7);
    let mut protocol = QkdProtocol::new(config).unwrap();
    let report = protocol.run(Some(200), 0.95, 128).unwrap();

    assert!(report.protocol_secure);
    assert_eq!(report.iterations, 200);
    let key = keys_match(&protocol, 0, 1);
    assert!(!key.is_empty());
    assert_eq!(report.key_length, key.len());
}

#[test]
fn bb84_runs_to_target() {
    let config = ProtocolConfig::default()
        .with_key_length(64)
        .with_security(0.95)
        .with_seed(99);
    let mut protocol = QkdProtocol::new(config).unwrap();
    let report = protocol.run_to_target().unwrap();

    assert!(report.protocol_secure);
    assert!(report.key_length >= 64);
    assert!(report.security >= 0.95);
    assert!(protocol.get_shortest_check_bits() >= 11);
    keys_match(&protocol, 0, 1);
}

#[test]
fn eavesdropper_is_detected_with_high_probability() {
    // 20 check bits: 1 - 0.75^20 is about 0.997.
    let security = 0.9968;
    assert_eq!(qkd_netsim::required_num_check_bits(security), 20);

    let runs = 40;
    let detected = (0..runs)
        .filter(|&seed| {
            let config = ProtocolConfig::default()
                .with_eavesdropping(vec![(0, 1)])
                .with_seed(seed);
            let mut protocol = QkdProtocol::new(config).unwrap();
            let report = protocol.run(None, security, 0).unwrap();
            !report.protocol_secure
        })
        .count();

    assert!(detected >= runs as usize - 3, "detected in {detected} of {runs} runs");
}

#[test]
fn eavesdropper_keeps_shadow_keys() {
    let config = ProtocolConfig::default()
        .with_eavesdropping(vec![(0, 1)])
        .with_check_bit_prob(0.0)
        .with_seed(4);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(50), 0.95, 128).unwrap();

    // Without check bits nothing can be noticed.
    assert!(protocol.is_secure());

    let eve = protocol.party(2).unwrap();
    assert!(eve.is_eavesdropper());
    assert_eq!(eve.name(), "E");
    assert_eq!(
        eve.sifted_keys().peer_len(PartyId(0)),
        protocol.party(0).unwrap().sifted_keys().peer_len(PartyId(1))
    );

    // Eve's ledgers do not count towards the metrics.
    assert_eq!(protocol.get_shortest_key_length(), protocol.key_length());
}

#[test]
fn chained_bb84_reconciles_every_adjacent_pair() {
    let config = ProtocolConfig::new(ProtocolVariant::ChainedBb84)
        .with_parties(4)
        .with_seed(12);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(400), 0.95, 128).unwrap();
    assert!(protocol.is_secure());

    let first = keys_match(&protocol, 0, 1);
    assert!(!first.is_empty());
    assert_eq!(keys_match(&protocol, 1, 2), first);
    assert_eq!(keys_match(&protocol, 2, 3), first);
}

#[test]
fn chained_bb84_detects_eavesdropper_on_inner_link() {
    let config = ProtocolConfig::new(ProtocolVariant::ChainedBb84)
        .with_parties(3)
        .with_eavesdropping(vec![(1, 2)])
        .with_check_bit_prob(1.0)
        .with_seed(5);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(2000), 0.95, 128).unwrap();

    assert!(!protocol.is_secure());
    assert!(
        protocol.party(1).unwrap().compromised_chls().contains(&PartyId(2))
            || protocol.party(2).unwrap().compromised_chls().contains(&PartyId(1))
    );
}

#[test]
fn star_protocol_two_shares_one_key() {
    let config = ProtocolConfig::new(ProtocolVariant::StarProtocol2)
        .with_parties(4)
        .with_seed(31);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(150), 0.95, 128).unwrap();
    assert!(protocol.is_secure());

    let key = keys_match(&protocol, 0, 1);
    assert!(!key.is_empty());
    assert_eq!(keys_match(&protocol, 0, 2), key);
    assert_eq!(keys_match(&protocol, 0, 3), key);
}

#[test]
fn star_protocol_two_legs_agree_from_the_first_rounds() {
    for seed in 0..40 {
        let config = ProtocolConfig::new(ProtocolVariant::StarProtocol2)
            .with_parties(4)
            .with_check_bit_prob(0.0)
            .with_seed(seed);
        let mut protocol = QkdProtocol::new(config).unwrap();
        let report = protocol.run(Some(2), 0.95, 128).unwrap();

        let key = keys_match(&protocol, 0, 1);
        assert_eq!(keys_match(&protocol, 0, 2), key, "seed {seed}");
        assert_eq!(keys_match(&protocol, 0, 3), key, "seed {seed}");
        assert_eq!(report.key_length, key.len(), "seed {seed}");
    }
}

#[test]
fn star_protocol_one_shares_one_key() {
    let config = ProtocolConfig::new(ProtocolVariant::StarProtocol1)
        .with_parties(3)
        .with_seed(2);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(200), 0.95, 128).unwrap();
    assert!(protocol.is_secure());

    let key = keys_match(&protocol, 0, 1);
    assert!(!key.is_empty());
    assert_eq!(keys_match(&protocol, 0, 2), key);
}

#[test]
fn same_seed_same_run() {
    let config = ProtocolConfig::new(ProtocolVariant::StarProtocol2)
        .with_parties(3)
        .with_eavesdropping(vec![(0, 2)])
        .with_seed(1234);

    let mut a = QkdProtocol::new(config.clone()).unwrap();
    let mut b = QkdProtocol::new(config).unwrap();
    a.run(Some(60), 0.95, 128).unwrap();
    b.run(Some(60), 0.95, 128).unwrap();

    assert_eq!(a.report(), b.report());
    assert_eq!(a.stored_data(), b.stored_data());
}

#[test]
fn snapshots_are_serializable_history() {
    let config = ProtocolConfig::default()
        .with_eavesdropping(vec![(0, 1)])
        .with_seed(3);
    let mut protocol = QkdProtocol::new(config).unwrap();
    protocol.run(Some(5), 0.95, 128).unwrap();

    let snapshot = protocol.get_stored_data_for_timestep(0).unwrap();
    assert_eq!(snapshot.protocol.iteration, 0);
    assert_eq!(snapshot.parties.len(), 3);
    assert_eq!(snapshot.edges.len(), 2);
    assert!(snapshot.channel.contains_key(&PartyId(0)));
    assert!(protocol.get_stored_data_for_timestep(99).is_none());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["parties"].is_object());
    assert!(json["edges"][0]["intercepted"].as_bool().unwrap());
}

#[test]
fn qubits_are_counted() {
    let mut protocol = QkdProtocol::new(ProtocolConfig::default().with_seed(0)).unwrap();
    protocol.run(Some(10), 0.95, 128).unwrap();
    assert_eq!(
        protocol.calculate_qubit_counts(),
        QubitCounts {
            generated: 10,
            transmitted: 10,
            received: 10
        }
    );
}

#[test]
fn construction_errors() {
    let no_leader = ProtocolConfig::new(ProtocolVariant::StarProtocol1).with_edges(vec![(0, 1), (1, 2)]);
    assert_eq!(
        QkdProtocol::new(no_leader).err(),
        Some(ProtocolError::Network(NetworkError::NoLeader))
    );

    let cycle = ProtocolConfig::new(ProtocolVariant::ChainedBb84).with_edges(vec![(0, 1), (1, 2), (2, 0)]);
    assert_eq!(
        QkdProtocol::new(cycle).err(),
        Some(ProtocolError::Network(NetworkError::NoChainHead))
    );

    let empty = ProtocolConfig::new(ProtocolVariant::ChainedBb84).with_edges(vec![]);
    assert_eq!(
        QkdProtocol::new(empty).err(),
        Some(ProtocolError::Network(NetworkError::EmptyTopology))
    );

    let unsized_star = ProtocolConfig::new(ProtocolVariant::StarProtocol2);
    assert_eq!(
        QkdProtocol::new(unsized_star).err(),
        Some(ProtocolError::Config(ConfigError::MissingTopology))
    );

    let unknown_edge = ProtocolConfig::default().with_eavesdropping(vec![(1, 0)]);
    assert_eq!(
        QkdProtocol::new(unknown_edge).err(),
        Some(ProtocolError::Network(NetworkError::UnknownEdge(PartyId(1), PartyId(0))))
    );
}
