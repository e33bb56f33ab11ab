//! Behavioural properties of the bridge engine over mock transports

use line_bridge::{BridgeConfig, BridgeEngine, ConfigError};
use proptest::prelude::*;
use serial_link::mock::{MockListener, MockSerial, MockSocket};
use std::time::{Duration, Instant};

type Engine = BridgeEngine<MockSerial, MockListener>;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn engine_with(config: BridgeConfig, peers: usize) -> (Engine, MockSerial, Vec<MockSocket>, Instant) {
    let serial = MockSerial::new();
    let listener = MockListener::new();
    let t0 = Instant::now();
    let mut engine =
        BridgeEngine::new_at(config.validate().unwrap(), serial.clone(), listener.clone(), t0).unwrap();

    let clients = (0..peers)
        .map(|i| listener.connect(&format!("192.168.1.{}:4000", i + 10)))
        .collect();
    engine.tick_at(t0).unwrap();
    (engine, serial, clients, t0)
}

#[test]
fn test_buffer_size_must_be_power_of_two() {
    for bad in [255, 257] {
        let config = BridgeConfig {
            uart_buffer_size: bad,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::NotPowerOfTwo {
                field: "uart_buffer_size",
                value: bad
            }
        );
    }

    let config = BridgeConfig {
        uart_buffer_size: 256,
        tcp_buffer_size: 256,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_line_flushes_exactly_once() {
    let (mut engine, serial, clients, t0) = engine_with(BridgeConfig::default(), 1);

    serial.push_input(b"no newline");
    engine.tick_at(t0 + ms(1)).unwrap();

    let mut flushes = 0;
    for step in 2..100 {
        flushes += engine.tick_at(t0 + ms(step * 10)).unwrap().uart_flushes;
    }

    assert_eq!(flushes, 1);
    assert_eq!(clients[0].take_output(), b"no newline");
}

#[test]
fn test_slow_client_does_not_stall_others() {
    let (mut engine, serial, clients, t0) = engine_with(
        BridgeConfig {
            client_backlog_limit: 16,
            ..Default::default()
        },
        2,
    );
    let (slow, fast) = (&clients[0], &clients[1]);
    slow.set_write_limit(Some(0));

    for i in 1..=3 {
        serial.push_input(b"hello\r\n");
        engine.tick_at(t0 + ms(i)).unwrap();
    }

    assert_eq!(fast.take_output(), b"hello\r\nhello\r\nhello\r\n");
    assert!(slow.is_shut_down());
    assert_eq!(engine.stats().slow_client_drops, 1);
    assert_eq!(engine.registry().len(), 1);
}

#[test]
fn test_keepalive_schedule() {
    let (mut engine, serial, _clients, t0) = engine_with(
        BridgeConfig {
            uart_keepalive_interval_ms: 1000,
            uart_keepalive_message: "PING".into(),
            ..Default::default()
        },
        0,
    );

    serial.push_input(b"x");
    engine.tick_at(t0 + ms(500)).unwrap();

    let fired: Vec<u64> = (501..=1600)
        .step_by(50)
        .filter(|&t| engine.tick_at(t0 + ms(t)).unwrap().keepalive_sent)
        .collect();

    assert_eq!(fired, vec![1501]);
    assert_eq!(serial.take_output(), b"PING");
}

#[test]
fn test_drop_on_timeout_removes_every_client_in_one_tick() {
    let (mut engine, serial, clients, t0) = engine_with(
        BridgeConfig {
            uart_timeout_drop_clients: true,
            ..Default::default()
        },
        2,
    );

    serial.push_input(b"half");
    engine.tick_at(t0 + ms(1)).unwrap();
    assert_eq!(engine.registry().len(), 2);

    let summary = engine.tick_at(t0 + ms(301)).unwrap();
    assert_eq!(summary.dropped_clients, 2);
    assert!(clients.iter().all(|c| c.is_shut_down()));
    assert_eq!(engine.stats().connection_count, 0);
}

proptest! {
    #[test]
    fn k_lines_make_k_broadcasts(lines in prop::collection::vec("[a-z0-9 ]{0,20}", 1..20)) {
        let (mut engine, serial, clients, t0) = engine_with(BridgeConfig::default(), 2);

        let mut expected = Vec::new();
        for line in &lines {
            expected.extend_from_slice(line.as_bytes());
            expected.extend_from_slice(b"\r\n");
        }
        serial.push_input(&expected);
        let summary = engine.tick_at(t0 + ms(1)).unwrap();

        prop_assert_eq!(summary.uart_flushes, lines.len());
        prop_assert_eq!(engine.stats().uart_lines, lines.len() as u64);
        for client in &clients {
            prop_assert_eq!(client.take_output(), expected.clone());
        }
    }

    #[test]
    fn chunked_tcp_input_reassembles(
        commands in prop::collection::vec("[A-Z+=?]{1,10}", 1..10),
        chunk in 1usize..8,
    ) {
        let (mut engine, serial, clients, t0) = engine_with(BridgeConfig::default(), 1);

        let mut stream = Vec::new();
        for command in &commands {
            stream.extend_from_slice(command.as_bytes());
            stream.push(b'\r');
        }
        for (i, piece) in stream.chunks(chunk).enumerate() {
            clients[0].push_input(piece);
            engine.tick_at(t0 + ms(i as u64 + 1)).unwrap();
        }

        prop_assert_eq!(serial.take_output(), stream);
        prop_assert_eq!(engine.stats().tcp_lines, commands.len() as u64);
    }
}
