//! Connection state for client sockets.
//!
//! Each connection owns its inbound accumulator, its pending output and its
//! session. Nothing here is shared between connections, so bytes and state
//! from different peers can never mix.

use crate::session::Session;
use bytes::{Buf, BytesMut};
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Bytes requested from the socket per read call.
const READ_CHUNK: usize = 4096;

/// Pending output above which a connection stops taking new input.
pub const OUTPUT_HIGH_WATER: usize = 64 * 1024;

/// Current registration state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Registered for readability only; no output pending.
    Reading,
    /// Output pending; registered for readability and writability.
    Writing,
    /// Registered for writability only. Input waits until the output backlog
    /// drains, or the peer is done sending and only the reply remains.
    Draining,
}

/// What one `fill` call produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStatus {
    /// Bytes appended to the inbound accumulator.
    pub read: usize,
    /// Peer closed its side of the stream.
    pub eof: bool,
    /// Stopped at the read budget; the socket may still hold data.
    pub budget_spent: bool,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    pub stream: S,
    pub peer: SocketAddr,
    pub session: Session,
    /// Bytes received but not yet decoded into lines.
    pub inbound: BytesMut,
    /// Bytes queued for the peer but not yet written.
    pub outbound: BytesMut,
    pub state: ConnState,
    /// No more input will be read: the peer sent EOF or `exit`.
    pub read_closed: bool,
}

impl<S: Read + Write> Connection<S> {
    /// Create a new connection with a fresh session.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            session: Session::new(),
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::new(),
            state: ConnState::Reading,
            read_closed: false,
        }
    }

    /// Queue bytes for the peer.
    pub fn queue(&mut self, data: &[u8]) {
        self.outbound.extend_from_slice(data);
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Output backlog is at the high-water mark.
    pub fn output_full(&self) -> bool {
        self.outbound.len() >= OUTPUT_HIGH_WATER
    }

    /// A complete line is waiting in the inbound accumulator.
    pub fn has_buffered_line(&self) -> bool {
        self.inbound.contains(&b'\n')
    }

    /// Nothing left to read, execute or write.
    pub fn is_finished(&self) -> bool {
        self.read_closed && self.outbound.is_empty() && !self.has_buffered_line()
    }

    /// Registration state matching the current buffers.
    pub fn wanted_state(&self) -> ConnState {
        if self.output_full() || (self.read_closed && self.has_pending_output()) {
            ConnState::Draining
        } else if self.has_pending_output() {
            ConnState::Writing
        } else {
            ConnState::Reading
        }
    }

    /// Read available input into the inbound accumulator.
    ///
    /// Stops at `WouldBlock`, end of stream, or once at least `budget` bytes
    /// were read. In the last case the socket may still be readable and the
    /// caller has to come back without waiting for a new readiness edge.
    pub fn fill(&mut self, budget: usize) -> io::Result<ReadStatus> {
        let mut status = ReadStatus::default();

        loop {
            if status.read >= budget {
                status.budget_spent = true;
                return Ok(status);
            }

            let start = self.inbound.len();
            self.inbound.resize(start + READ_CHUNK, 0);

            let result = self.stream.read(&mut self.inbound[start..]);
            match result {
                Ok(0) => {
                    self.inbound.truncate(start);
                    status.eof = true;
                    return Ok(status);
                }
                Ok(n) => {
                    self.inbound.truncate(start + n);
                    status.read += n;
                }
                Err(e) => {
                    self.inbound.truncate(start);
                    match e.kind() {
                        io::ErrorKind::WouldBlock => return Ok(status),
                        io::ErrorKind::Interrupted => continue,
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    /// Write as much pending output as the socket accepts.
    ///
    /// Returns `true` once everything queued has been written.
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

/// Registry of active connections using slab allocation.
///
/// The slab key doubles as the poll token of the connection.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns the connection back if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Result<usize, Connection<S>> {
        if self.is_full() {
            return Err(conn);
        }
        Ok(self.connections.insert(conn))
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    /// Check if a connection exists.
    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }
}
