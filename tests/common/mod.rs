// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Shared fixtures for the integration tests: a three-field sample record
//! exercising the wire views, and blocking-stream frame helpers for the
//! plain-socket side of each test.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;

use wirenet::wire::IoBuffer;
use wirenet::{WireError, WireIn, WireOut};

const KEY1: u8 = 1;
const KEY2: u8 = 2;
const KEY3: u8 = 3;

/// Demonstration record carried inside frame bodies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleRecord {
    pub value1: i32,
    pub value2: i64,
    pub value3: f64,
}

impl SampleRecord {
    pub fn write(&self, wire: &mut WireOut<'_>) -> Result<(), WireError> {
        wire.write_i32(KEY1, self.value1)?
            .write_i64(KEY2, self.value2)?
            .write_f64(KEY3, self.value3)?;
        Ok(())
    }

    pub fn read(wire: &mut WireIn<'_>) -> Result<Self, WireError> {
        Ok(Self {
            value1: wire.read_i32(KEY1)?,
            value2: wire.read_i64(KEY2)?,
            value3: wire.read_f64(KEY3)?,
        })
    }
}

/// Decode a record from a raw frame body.
pub fn decode_record(body: &[u8]) -> SampleRecord {
    let mut buf = IoBuffer::with_capacity(body.len());
    buf.write_bytes(body);
    buf.set_position(0);
    SampleRecord::read(&mut WireIn::new(&mut buf)).expect("record decodes")
}

/// Encode a record into a raw frame body.
pub fn encode_record(record: &SampleRecord) -> Vec<u8> {
    let mut buf = IoBuffer::with_capacity(64);
    record.write(&mut WireOut::new(&mut buf)).expect("record encodes");
    let end = buf.position();
    buf.slice(0, end).to_vec()
}

/// Write one length-prefixed frame to a blocking stream.
pub fn send_frame(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(body.len() as u16).to_be_bytes())?;
    stream.write_all(body)
}

/// Read one length-prefixed frame from a blocking stream.
pub fn recv_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header)?;
    let mut body = vec![0u8; usize::from(u16::from_be_bytes(header))];
    stream.read_exact(&mut body)?;
    Ok(body)
}
