// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Connector integration tests: an outbound reactor-driven link against a
//! plain blocking server.

mod common;

use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{decode_record, recv_frame, SampleRecord};
use wirenet::channel::Channel;
use wirenet::connector::Connector;
use wirenet::reactor::{Reactor, ReactorContext};
use wirenet::registry::CloseableRegistry;
use wirenet::wire::{FrameHandler, FrameLimits, MAX_FRAME_BODY};
use wirenet::{ReactorConfig, WireError, WireIn, WireOut};

/// Publishes one record when the link has nothing inbound to process.
struct Greeter {
    greeted: bool,
}

impl FrameHandler for Greeter {
    fn on_frame(
        &mut self,
        _input: &mut WireIn<'_>,
        _output: &mut WireOut<'_>,
    ) -> Result<(), WireError> {
        Ok(())
    }

    fn publish(&mut self, output: &mut WireOut<'_>) -> Result<(), WireError> {
        if self.greeted {
            return Ok(());
        }
        self.greeted = true;
        SampleRecord { value1: 7, value2: 11, value3: 0.25 }.write(output)
    }
}

fn wide_config() -> ReactorConfig {
    ReactorConfig {
        frame_limits: FrameLimits {
            max_publish_body: MAX_FRAME_BODY,
            max_reply_body: MAX_FRAME_BODY,
        },
        ..ReactorConfig::default()
    }
}

#[test]
fn connector_hands_the_channel_to_the_reactor() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let reactor = Arc::new(Reactor::new("outbound-reactor", wide_config()).unwrap());
    reactor.start().unwrap();

    let registration_target = Arc::clone(&reactor);
    let mut connector = Connector::new(
        "outbound-link",
        Arc::clone(reactor.closeables()),
        move || Channel::connect(addr),
    )
    .with_on_connected(move |channel| {
        let channel = Arc::clone(channel);
        // A teardown racing the connect loses the registration; the
        // registry already owns the cleanup in that case.
        let _ = registration_target.add_pending_registration(Box::new(
            move |ctx: &mut ReactorContext<'_>| {
                ctx.register_channel(channel, Box::new(Greeter { greeted: false }), None, false)
                    .map(|_| ())
            },
        ));
    });

    connector.connect();

    let (mut server_side, _) = listener.accept().unwrap();
    server_side.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // The reactor-driven side publishes its greeting unprompted.
    let greeting = decode_record(&recv_frame(&mut server_side).unwrap());
    assert_eq!(greeting, SampleRecord { value1: 7, value2: 11, value3: 0.25 });

    let deadline = Instant::now() + Duration::from_secs(5);
    while connector.current_channel().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let channel = connector.current_channel().expect("channel published");
    assert!(!channel.is_closed());

    assert_eq!(connector.attempts(), 0);
    connector.set_successfully_connected();
    assert_eq!(connector.attempts(), 0);

    reactor.close();
    assert!(channel.is_closed(), "teardown closes registry-owned channels");
}

#[test]
fn connect_racing_teardown_discards_the_channel_quietly() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Arc::new(CloseableRegistry::new());
    registry.close_all();

    let connector =
        Connector::new("raced-link", Arc::clone(&registry), move || Channel::connect(addr));
    connector.connect();

    // The transport connect succeeds, registration fails, and the channel is
    // closed quietly: the accepted side sees EOF, not traffic.
    let (mut server_side, _) = listener.accept().unwrap();
    server_side.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut byte = [0u8; 1];
    match server_side.read(&mut byte) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {} bytes from a discarded channel", n),
        Err(_) => {}
    }

    assert!(connector.current_channel().is_none());
}

#[test]
fn reconnect_after_drop_replaces_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Arc::new(CloseableRegistry::new());
    let mut connector =
        Connector::new("flappy-link", Arc::clone(&registry), move || Channel::connect(addr));

    connector.connect();
    let (first_peer, _) = listener.accept().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while connector.current_channel().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let first = connector.current_channel().expect("first channel");

    // The link drops; reconnect with backoff replaces the channel.
    drop(first_peer);
    connector.connect_later();
    assert_eq!(connector.attempts(), 1);
    assert!(first.is_closed(), "stale channel is discarded");

    let (_second_peer, _) = listener.accept().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(current) = connector.current_channel() {
            if current.channel_id() != first.channel_id() {
                break;
            }
        }
        assert!(Instant::now() < deadline, "replacement channel never arrived");
        std::thread::sleep(Duration::from_millis(10));
    }

    connector.set_successfully_connected();
    assert_eq!(connector.attempts(), 0);
    registry.close_all();
}
