//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! Everything runs on the calling thread. Each ready event gets one bounded
//! turn: at most one read budget of input, and no new commands once the
//! connection's output backlog is at the high-water mark. Connections that
//! still have input after their turn are queued on the ready list and revisited
//! after the current batch of events, since an edge-triggered poll will not
//! report them again.

use crate::config::Config;
use crate::fs::FileSystem;
use crate::protocol::{greeting, Interpreter};
use crate::runtime::connection::{
    ConnState, Connection, ConnectionRegistry, ReadStatus, OUTPUT_HIGH_WATER,
};
use crate::runtime::request::{process_lines, ProcessResult};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Single-threaded connection multiplexer.
pub struct Server<F: FileSystem> {
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionRegistry<TcpStream>,
    interpreter: Interpreter<F>,
    /// Connections owed another turn without a new readiness event.
    ready: Vec<usize>,
    events_capacity: usize,
    max_line_length: usize,
}

impl<F: FileSystem> Server<F> {
    /// Bind the listener and register it with a new poll instance.
    pub fn bind(config: &Config, interpreter: Interpreter<F>) -> io::Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::from_std(create_listener(addr)?);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            connections: ConnectionRegistry::new(config.max_connections),
            interpreter,
            ready: Vec::new(),
            events_capacity: config.events_capacity,
            max_line_length: config.max_line_length,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the control loop. Only returns if polling itself fails.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.events_capacity);

        info!(
            addr = %self.local_addr()?,
            root = %self.interpreter.root().display(),
            "Server started"
        );

        loop {
            let timeout = if self.ready.is_empty() {
                None
            } else {
                Some(Duration::ZERO)
            };

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    Token(conn_id) => {
                        if let Err(e) = self.handle_connection_event(conn_id, event) {
                            debug!(conn_id, error = %e, "Connection error");
                            self.close_connection(conn_id);
                        }
                    }
                }
            }

            self.revisit_ready();
        }
    }

    /// Give every queued connection one more turn.
    fn revisit_ready(&mut self) {
        for conn_id in std::mem::take(&mut self.ready) {
            if !self.connections.contains(conn_id) {
                continue;
            }
            if let Err(e) = self.handle_readable(conn_id) {
                debug!(conn_id, error = %e, "Connection error");
                self.close_connection(conn_id);
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let mut conn = Connection::new(stream, peer_addr);
                    conn.queue(greeting());

                    let conn_id = match self.connections.insert(conn) {
                        Ok(id) => id,
                        Err(_) => {
                            warn!(peer = %peer_addr, "Connection limit reached");
                            continue;
                        }
                    };

                    info!(
                        conn_id,
                        peer = %peer_addr,
                        active = self.connections.len(),
                        "Client accepted"
                    );

                    if let Err(e) = self.register(conn_id) {
                        debug!(conn_id, error = %e, "Failed to set up connection");
                        self.close_connection(conn_id);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Register a fresh connection and push out its greeting.
    fn register(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        self.poll
            .registry()
            .register(&mut conn.stream, Token(conn_id), Interest::READABLE)?;
        conn.flush()?;
        sync_interest(&self.poll, conn, conn_id)
    }

    fn handle_connection_event(
        &mut self,
        conn_id: usize,
        event: &mio::event::Event,
    ) -> io::Result<()> {
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_readable() || event.is_read_closed() {
            self.handle_readable(conn_id)?;
        }

        // Re-check connection exists (may have been removed)
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_writable() {
            self.handle_writable(conn_id)?;
        }

        Ok(())
    }

    fn handle_readable(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        let mut status = ReadStatus::default();
        if !conn.read_closed && !conn.output_full() {
            status = conn.fill(self.max_line_length)?;
            if status.eof {
                conn.read_closed = true;
            }
        }

        if !conn.output_full() {
            let result = process_lines(
                &mut conn.inbound,
                &mut conn.outbound,
                &mut conn.session,
                &mut self.interpreter,
                self.max_line_length,
                OUTPUT_HIGH_WATER,
            );

            match result {
                ProcessResult::NeedData | ProcessResult::Response { .. } => {}
                ProcessResult::Quit => {
                    info!(conn_id, peer = %conn.peer, "Client logged out");
                    conn.inbound.clear();
                    conn.read_closed = true;
                }
                ProcessResult::Error(e) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            }
        }

        conn.flush()?;
        if conn.is_finished() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection finished",
            ));
        }

        if status.budget_spent || (!conn.output_full() && conn.has_buffered_line()) {
            schedule(&mut self.ready, conn_id);
        }
        sync_interest(&self.poll, conn, conn_id)
    }

    fn handle_writable(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        let was_draining = conn.state == ConnState::Draining;
        conn.flush()?;
        if conn.is_finished() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection finished",
            ));
        }

        // Input held back by the backlog, or unread since the pause
        if was_draining && !conn.output_full() {
            schedule(&mut self.ready, conn_id);
        }
        sync_interest(&self.poll, conn, conn_id)
    }

    fn close_connection(&mut self, conn_id: usize) {
        if let Some(mut conn) = self.connections.remove(conn_id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(conn_id, peer = %conn.peer, "Connection closed");
        }
    }
}

/// Queue a connection for another turn, once.
fn schedule(ready: &mut Vec<usize>, conn_id: usize) {
    if !ready.contains(&conn_id) {
        ready.push(conn_id);
    }
}

/// Re-register the connection if its buffers call for a different interest.
fn sync_interest(
    poll: &Poll,
    conn: &mut Connection<TcpStream>,
    conn_id: usize,
) -> io::Result<()> {
    let wanted = conn.wanted_state();
    if wanted == conn.state {
        return Ok(());
    }

    let interest = match wanted {
        ConnState::Reading => Interest::READABLE,
        ConnState::Writing => Interest::READABLE | Interest::WRITABLE,
        ConnState::Draining => Interest::WRITABLE,
    };
    poll.registry()
        .reregister(&mut conn.stream, Token(conn_id), interest)?;
    conn.state = wanted;
    Ok(())
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
