//! The binkp protocol engine.
//!
//! A [`Session`] owns one transport, one outbound queue and one inbound sink.
//! It runs the handshake, then multiplexes sending and receiving until both
//! sides have said `EOB`.
//!
//! # Handshake
//!
//! ```text
//! Originating                          Answering
//!     |  NUL SYS/ZYZ/LOC/VER/OPT, ADR     |
//!     | --------------------------------> |
//!     |  NUL ..., OPT CRAM-MD5-<hex>, ADR |
//!     | <-------------------------------- |
//!     |  PWD (digest or plain)            |
//!     | --------------------------------> |
//!     |                      check ADR, PWD
//!     |  OK                               |
//!     | <-------------------------------- |
//!     |          Established              |
//! ```
//!
//! With CRAM-MD5 disabled the originating side sends `PWD` right after its
//! own `ADR`. The whole handshake runs against a single deadline.
//!
//! # Transfer
//!
//! One file is in flight per direction. The sender announces it with `FILE`,
//! streams data frames, then waits for `GOT`, `SKIP` or `GET` before
//! announcing the next one. An empty queue is announced with `EOB`.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::mem;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use super::config::SessionConfig;
use super::cram::{CRAM_MD5_PREFIX, CRAM_PREFIX, Challenge};
use super::remote::{RemoteNode, address_matches};
use super::report::SessionReport;
use super::state::{SessionState, Side};
use crate::core::{
    AuthError, BinkpError, BinkpResult, FAREWELL_TIMEOUT, InboundSink, OPT_CRC,
    PROTOCOL_VERSION, PRODUCT_NAME, ProtocolError,
};
use crate::frame::args::{FileInfo, GetRequest, ack_name, split_addresses};
use crate::frame::{Command, CommandId, Frame, read_frame, try_read_frame, write_frame};
use crate::transfer::{OutboundQueue, ReceiveBuffer};
use crate::transport::{Transport, TransportCloser};

/// Sending direction.
#[derive(Debug)]
enum Outbound {
    /// Nothing announced.
    Idle,
    /// FILE sent, data frames still to go.
    Sending(String),
    /// Every byte sent; waiting for GOT, SKIP or GET.
    AwaitingAck(String),
}

impl Outbound {
    fn name(&self) -> Option<&str> {
        match self {
            Outbound::Idle => None,
            Outbound::Sending(name) | Outbound::AwaitingAck(name) => Some(name),
        }
    }
}

/// Receiving direction.
#[derive(Debug)]
enum Inbound {
    Idle,
    Receiving(ReceiveBuffer),
    /// Dropping data frames until the next FILE.
    Discarding(String),
}

/// Source of extra outbound items, run once the remote is authenticated.
type OutboundRefill = Box<dyn FnOnce(&RemoteNode, bool) -> io::Result<OutboundQueue> + Send>;

/// A binkp session over one transport.
pub struct Session<S, K> {
    transport: Transport<S>,
    config: SessionConfig,
    queue: OutboundQueue,
    sink: K,
    state: SessionState,
    history: Vec<SessionState>,
    remote: RemoteNode,
    /// Handshake commands that arrived before we waited for them.
    early: VecDeque<Command>,
    password: Option<String>,
    /// Challenge we offered (answering side).
    challenge: Option<Challenge>,
    refill: Option<OutboundRefill>,
    secure: bool,
    cram_md5: bool,
    crc: bool,
    outbound: Outbound,
    inbound: Inbound,
    partials: HashMap<Vec<u8>, ReceiveBuffer>,
    eob_sent: bool,
    eob_received: bool,
    sent: Vec<String>,
    skipped: Vec<String>,
    received: Vec<String>,
    refused: Vec<String>,
    bytes_sent: u64,
    bytes_received: u64,
    started: Instant,
}

impl<S, K> Session<S, K>
where
    S: AsyncRead + AsyncWrite,
    K: InboundSink,
{
    /// Create a session. Nothing is exchanged until [`Session::run`].
    pub fn new(transport: Transport<S>, config: SessionConfig, queue: OutboundQueue, sink: K) -> Self {
        let password = config.password.clone();
        Self {
            transport,
            config,
            queue,
            sink,
            state: SessionState::Init,
            history: vec![SessionState::Init],
            remote: RemoteNode::default(),
            early: VecDeque::new(),
            password,
            challenge: None,
            refill: None,
            secure: false,
            cram_md5: false,
            crc: false,
            outbound: Outbound::Idle,
            inbound: Inbound::Idle,
            partials: HashMap::new(),
            eob_sent: false,
            eob_received: false,
            sent: Vec::new(),
            skipped: Vec::new(),
            received: Vec::new(),
            refused: Vec::new(),
            bytes_sent: 0,
            bytes_received: 0,
            started: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Remote node details learned so far.
    pub fn remote(&self) -> &RemoteNode {
        &self.remote
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Outbound queue.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Inbound sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Add items to the queue once the remote is authenticated.
    ///
    /// `fill` runs once, right before `Established`, with the remote node and
    /// whether the session is password protected. Its items go after anything
    /// already queued; names already queued are dropped.
    pub fn refill_after_auth<F>(&mut self, fill: F)
    where
        F: FnOnce(&RemoteNode, bool) -> io::Result<OutboundQueue> + Send + 'static,
    {
        self.refill = Some(Box::new(fill));
    }

    /// Handle that aborts the session from another task.
    pub fn closer(&self) -> TransportCloser {
        self.transport.closer()
    }

    /// Give the queue (unsent and skipped items) and the sink back.
    pub fn into_parts(self) -> (OutboundQueue, K) {
        (self.queue, self.sink)
    }

    /// Summary of what happened so far.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            side: self.config.side,
            remote: self.remote.clone(),
            secure: self.secure,
            cram_md5: self.cram_md5,
            crc: self.crc,
            sent: self.sent.clone(),
            skipped: self.skipped.clone(),
            received: self.received.clone(),
            refused: self.refused.clone(),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            elapsed: self.started.elapsed(),
        }
    }

    /// Run the handshake and the transfer to completion.
    pub async fn run(&mut self) -> BinkpResult<SessionReport> {
        self.handshake().await?;
        self.transfer().await?;
        let report = self.report();
        info!("{}", report.summary());
        Ok(report)
    }

    /// Run the handshake up to `Established`.
    ///
    /// On failure the matching `ERR`/`BSY` is sent best-effort and the
    /// session is `Terminated`.
    pub async fn handshake(&mut self) -> BinkpResult<()> {
        match self.state {
            SessionState::Init => {}
            SessionState::Terminated => return Err(ProtocolError::Terminated.into()),
            _ => return Ok(()),
        }
        let result = self.negotiate().await;
        self.settle(result).await
    }

    /// Exchange files until both sides sent `EOB`, then close the transport.
    pub async fn transfer(&mut self) -> BinkpResult<()> {
        match self.state {
            SessionState::Init => self.handshake().await?,
            SessionState::Established => {}
            _ => return Err(ProtocolError::Terminated.into()),
        }
        let result = self.exchange().await;
        self.settle(result).await
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    async fn negotiate(&mut self) -> BinkpResult<()> {
        let deadline = Instant::now() + self.config.handshake_timeout;

        self.enter(SessionState::WaitConnect);
        if self.config.side == Side::Answering && self.config.cram_md5 {
            self.challenge = Some(Challenge::generate());
        }
        self.send_banner().await?;

        self.enter(SessionState::SendPassword);
        if self.config.side == Side::Originating {
            if let Some(password) = self.password.clone() {
                let argument = self.password_argument(password, deadline).await?;
                self.send_command(CommandId::Pwd, argument).await?;
                self.secure = true;
            }
        }

        self.enter(SessionState::WaitAddress);
        let addresses = self.wait_for(CommandId::Adr, deadline).await?;

        self.enter(SessionState::AuthenticateRemote);
        self.authenticate_addresses(&addresses)?;
        if self.config.side == Side::Answering {
            if let Some(expected) = self.password.clone() {
                let password = self.wait_for(CommandId::Pwd, deadline).await?;
                self.check_password(password.trim(), &expected)?;
                self.secure = true;
            }
        }

        if let Some(fill) = self.refill.take() {
            for item in fill(&self.remote, self.secure)?.into_remaining() {
                if let Err(e) = self.queue.push(item) {
                    warn!("not queueing for {}: {}", self.remote.primary_address(), e);
                }
            }
        }

        self.enter(SessionState::SecureCheck);
        if self.config.side == Side::Answering {
            let note = if self.secure { "secure" } else { "non-secure" };
            self.send_command(CommandId::Ok, note).await?;
        }

        self.enter(SessionState::WaitOk);
        if self.config.side == Side::Originating {
            self.wait_for(CommandId::Ok, deadline).await?;
        }

        for cmd in self.early.drain(..) {
            debug!("dropping unused handshake command {}", cmd);
        }
        self.crc = self.config.crc && self.remote.supports(OPT_CRC);
        self.enter(SessionState::Established);
        info!(
            "{} session with {} ({}) established{}{}",
            self.config.side,
            self.remote.primary_address(),
            self.transport.peer(),
            if self.secure { ", secure" } else { "" },
            if self.crc { ", CRC" } else { "" },
        );
        Ok(())
    }

    /// `PWD` argument for the originating side.
    ///
    /// With CRAM-MD5 enabled this waits for the remote banner first, since the
    /// challenge arrives there. The remote `ADR` read on the way is kept for
    /// `WaitAddress`.
    async fn password_argument(&mut self, password: String, deadline: Instant) -> BinkpResult<String> {
        if !self.config.cram_md5 {
            return Ok(password);
        }
        let addresses = self.wait_for(CommandId::Adr, deadline).await?;
        self.early.push_front(Command::new(CommandId::Adr, addresses));
        match self.remote.cram_challenge() {
            Some(challenge) => {
                self.cram_md5 = true;
                Ok(challenge.response(&password)?)
            }
            None => {
                debug!("no CRAM challenge from {}, sending plain password", self.transport.peer());
                Ok(password)
            }
        }
    }

    /// Check a remote `PWD` against `expected` (answering side).
    fn check_password(&mut self, received: &str, expected: &str) -> BinkpResult<()> {
        if let Some(digest) = received.strip_prefix(CRAM_MD5_PREFIX) {
            let challenge = self
                .challenge
                .as_ref()
                .ok_or_else(|| AuthError::Cram("no challenge was offered".into()))?;
            if !challenge.verify(expected, digest)? {
                return Err(AuthError::PasswordMismatch.into());
            }
            self.cram_md5 = true;
            return Ok(());
        }
        if received.starts_with(CRAM_PREFIX) {
            return Err(AuthError::Cram("only CRAM-MD5 is supported".into()).into());
        }
        if received != expected {
            return Err(AuthError::PasswordMismatch.into());
        }
        Ok(())
    }

    async fn send_banner(&mut self) -> BinkpResult<()> {
        let mut lines = vec![
            format!("SYS {}", self.config.system_name),
            format!("ZYZ {}", self.config.sysop),
            format!("LOC {}", self.config.location),
            format!(
                "VER {}/{} {}",
                PRODUCT_NAME,
                env!("CARGO_PKG_VERSION"),
                PROTOCOL_VERSION
            ),
        ];
        let mut options = Vec::new();
        if self.config.crc {
            options.push(OPT_CRC.to_string());
        }
        if let Some(challenge) = &self.challenge {
            options.push(challenge.option());
        }
        if !options.is_empty() {
            lines.push(format!("OPT {}", options.join(" ")));
        }
        for line in lines {
            self.send_command(CommandId::Nul, line).await?;
        }
        let addresses = self.config.local_addresses.join(" ");
        self.send_command(CommandId::Adr, addresses).await
    }

    fn authenticate_addresses(&mut self, argument: &str) -> BinkpResult<()> {
        let addresses = split_addresses(argument);
        if addresses.is_empty() {
            return Err(AuthError::NoAddress.into());
        }
        self.remote.addresses = addresses;

        if self.config.side == Side::Answering {
            let node_password = self.config.node_passwords.iter().find_map(|(address, pw)| {
                self.remote
                    .addresses
                    .iter()
                    .any(|a| address_matches(a, address))
                    .then(|| pw.clone())
            });
            if node_password.is_some() {
                self.password = node_password;
            }
        }

        let expected = &self.config.expected_addresses;
        let known = expected.is_empty()
            || self
                .remote
                .addresses
                .iter()
                .any(|a| expected.iter().any(|e| address_matches(a, e)));
        if known {
            return Ok(());
        }
        if self.password.is_none() {
            Err(AuthError::AddressRejected(argument.to_string()).into())
        } else {
            Err(AuthError::UnknownAddress(argument.to_string()).into())
        }
    }

    /// Wait for a handshake command, recording `NUL` lines on the way.
    ///
    /// Fails with a timeout once `deadline` passes, however many other
    /// frames arrive before it.
    async fn wait_for(&mut self, id: CommandId, deadline: Instant) -> BinkpResult<String> {
        if let Some(pos) = self.early.iter().position(|c| c.id == id) {
            if let Some(cmd) = self.early.remove(pos) {
                return Ok(cmd.text().into_owned());
            }
        }
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(BinkpError::Timeout(self.config.handshake_timeout));
            }
            let frame = read_frame(&mut self.transport, left).await?;
            let cmd = match frame {
                Frame::Command(cmd) => cmd,
                Frame::Data(_) => {
                    return Err(ProtocolError::UnexpectedData { state: self.state }.into());
                }
            };
            info!("recv {}", cmd);
            match cmd.id {
                found if found == id => return Ok(cmd.text().into_owned()),
                CommandId::Nul => self.remote.record_info(&cmd.text()),
                CommandId::Err => return Err(BinkpError::Remote(cmd.text().into_owned())),
                CommandId::Bsy => return Err(BinkpError::PeerBusy(cmd.text().into_owned())),
                CommandId::Adr | CommandId::Pwd | CommandId::Ok => self.early.push_back(cmd),
                other => {
                    return Err(ProtocolError::UnexpectedCommand {
                        command: other,
                        state: self.state,
                    }
                    .into());
                }
            }
        }
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    async fn exchange(&mut self) -> BinkpResult<()> {
        while !self.finished() {
            self.send_next().await?;

            let mut progressed = false;
            while !self.finished() {
                match try_read_frame(&mut self.transport).await? {
                    Some(frame) => {
                        self.dispatch(frame).await?;
                        progressed = true;
                    }
                    None => break,
                }
            }

            if !progressed && !self.has_outbound_work() && !self.finished() {
                let frame = read_frame(&mut self.transport, self.config.idle_timeout).await?;
                self.dispatch(frame).await?;
            }
        }
        self.terminate().await;
        Ok(())
    }

    fn finished(&self) -> bool {
        self.eob_sent
            && self.eob_received
            && matches!(self.outbound, Outbound::Idle)
            && !matches!(self.inbound, Inbound::Receiving(_))
    }

    fn has_outbound_work(&self) -> bool {
        match self.outbound {
            Outbound::Sending(_) => true,
            Outbound::AwaitingAck(_) => false,
            Outbound::Idle => !self.queue.is_empty() || !self.eob_sent,
        }
    }

    /// Send at most one frame of outbound work.
    async fn send_next(&mut self) -> BinkpResult<()> {
        let name = match &self.outbound {
            Outbound::AwaitingAck(_) => return Ok(()),
            Outbound::Sending(name) => name.clone(),
            Outbound::Idle => {
                let next = self.queue.head_mut().map(|item| item.name().to_string());
                return match next {
                    Some(name) => self.announce(&name).await,
                    None if !self.eob_sent => {
                        self.eob_sent = true;
                        self.send_command(CommandId::Eob, "").await
                    }
                    None => Ok(()),
                };
            }
        };

        let Some(item) = self.queue.get_mut(&name) else {
            self.outbound = Outbound::Idle;
            return Ok(());
        };
        let chunk = item.read_chunk(self.config.chunk_size)?;
        let done = chunk.is_empty() || item.is_exhausted();
        if !chunk.is_empty() {
            trace!("send data {} bytes of {}", chunk.len(), name);
            self.bytes_sent += chunk.len() as u64;
            let frame = Frame::Data(chunk);
            write_frame(&mut self.transport, &frame, self.config.data_timeout).await?;
        }
        if done {
            self.outbound = Outbound::AwaitingAck(name);
        }
        Ok(())
    }

    /// Send a FILE line for `name` at its current cursor.
    async fn announce(&mut self, name: &str) -> BinkpResult<()> {
        let crc = self.crc;
        let Some(item) = self.queue.get_mut(name) else {
            return Ok(());
        };
        let info = FileInfo {
            name: item.name().as_bytes().to_vec(),
            size: item.size(),
            modified_at: item.modified_at(),
            offset: item.cursor(),
            crc: if crc { Some(item.crc32()?) } else { None },
        };
        let exhausted = item.is_exhausted();
        self.send_command(CommandId::File, info.file_line()).await?;
        let name = name.to_string();
        self.outbound = if exhausted {
            Outbound::AwaitingAck(name)
        } else {
            Outbound::Sending(name)
        };
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> BinkpResult<()> {
        let cmd = match frame {
            Frame::Data(bytes) => return self.on_data(bytes).await,
            Frame::Command(cmd) => cmd,
        };
        info!("recv {}", cmd);
        match cmd.id {
            CommandId::Nul => {
                self.remote.record_info(&cmd.text());
                Ok(())
            }
            CommandId::File => self.on_file(&cmd.argument).await,
            CommandId::Got => self.on_got(&cmd.argument),
            CommandId::Skip => self.on_skip(&cmd.argument),
            CommandId::Get => self.on_get(&cmd.argument).await,
            CommandId::Eob => {
                self.on_eob();
                Ok(())
            }
            CommandId::Ok => {
                debug!("ignoring repeated M_OK");
                Ok(())
            }
            CommandId::Err => Err(BinkpError::Remote(cmd.text().into_owned())),
            CommandId::Bsy => Err(BinkpError::PeerBusy(cmd.text().into_owned())),
            CommandId::Adr | CommandId::Pwd => Err(ProtocolError::UnexpectedCommand {
                command: cmd.id,
                state: self.state,
            }
            .into()),
        }
    }

    async fn on_file(&mut self, argument: &[u8]) -> BinkpResult<()> {
        let info = FileInfo::parse(argument).ok_or_else(|| malformed(CommandId::File, argument))?;
        let display = info.display_name().into_owned();

        if let Inbound::Receiving(open) = mem::replace(&mut self.inbound, Inbound::Idle) {
            if !open.matches(&info) {
                warn!(
                    "{} interrupted at {} of {} bytes",
                    open.info().display_name(),
                    open.received(),
                    open.info().size
                );
            }
            self.partials.insert(open.info().name.clone(), open);
        }

        if !self.sink.accepts(&display, info.size, info.modified_at) {
            info!("refusing {}", display);
            self.partials.remove(&info.name);
            self.send_command(CommandId::Skip, info.ack_line()).await?;
            self.refused.push(display.clone());
            self.inbound = Inbound::Discarding(display);
            return Ok(());
        }

        let buffer = if info.offset == 0 {
            self.partials.remove(&info.name);
            Some(ReceiveBuffer::new(info.clone()))
        } else {
            match self.partials.remove(&info.name) {
                Some(mut partial) if partial.matches(&info) => {
                    partial.resume_at(info.clone()).then_some(partial)
                }
                _ => None,
            }
        };

        match buffer {
            Some(buffer) => {
                debug!("receiving {} from offset {}", display, info.offset);
                let complete = buffer.is_complete();
                self.inbound = Inbound::Receiving(buffer);
                if complete {
                    self.complete_inbound().await?;
                }
            }
            None => {
                info!("no partial copy of {}, asking for all of it", display);
                let get = GetRequest::for_file(&info, 0);
                self.send_command(CommandId::Get, get.line()).await?;
                self.inbound = Inbound::Discarding(display);
            }
        }
        Ok(())
    }

    async fn on_data(&mut self, bytes: Vec<u8>) -> BinkpResult<()> {
        let complete = match &mut self.inbound {
            Inbound::Receiving(buffer) => {
                if bytes.len() as u64 > buffer.remaining() {
                    return Err(ProtocolError::DataOverrun {
                        name: buffer.info().display_name().into_owned(),
                        expected: buffer.info().size,
                        received: buffer.received() + bytes.len() as u64,
                    }
                    .into());
                }
                trace!("recv data {} bytes of {}", bytes.len(), buffer.info().display_name());
                buffer.append(&bytes);
                self.bytes_received += bytes.len() as u64;
                buffer.is_complete()
            }
            Inbound::Discarding(name) => {
                trace!("discarding {} bytes of {}", bytes.len(), name);
                return Ok(());
            }
            Inbound::Idle => {
                return Err(ProtocolError::UnexpectedData { state: self.state }.into());
            }
        };
        if complete {
            self.complete_inbound().await?;
        }
        Ok(())
    }

    async fn complete_inbound(&mut self) -> BinkpResult<()> {
        let Inbound::Receiving(buffer) = mem::replace(&mut self.inbound, Inbound::Idle) else {
            return Ok(());
        };
        let info = buffer.info().clone();
        let display = info.display_name().into_owned();
        if !buffer.crc_matches() {
            warn!("CRC mismatch on {}, skipping it", display);
            self.refused.push(display);
            return self.send_command(CommandId::Skip, info.ack_line()).await;
        }
        self.sink.deliver(buffer.finish())?;
        self.received.push(display);
        self.send_command(CommandId::Got, info.ack_line()).await
    }

    fn on_got(&mut self, argument: &[u8]) -> BinkpResult<()> {
        let raw = ack_name(argument).ok_or_else(|| malformed(CommandId::Got, argument))?;
        let Ok(name) = std::str::from_utf8(raw) else {
            warn!("M_GOT for {} which is not queued", String::from_utf8_lossy(raw));
            return Ok(());
        };
        match self.queue.remove(name) {
            Some(mut item) => {
                item.acknowledged()?;
                info!("{} delivered to {}", name, self.remote.primary_address());
                self.sent.push(name.to_string());
                if self.outbound.name() == Some(name) {
                    self.outbound = Outbound::Idle;
                }
            }
            None => warn!("M_GOT for {} which is not queued", name),
        }
        Ok(())
    }

    fn on_skip(&mut self, argument: &[u8]) -> BinkpResult<()> {
        let raw = ack_name(argument).ok_or_else(|| malformed(CommandId::Skip, argument))?;
        let Ok(name) = std::str::from_utf8(raw) else {
            warn!("M_SKIP for {} which is not queued", String::from_utf8_lossy(raw));
            return Ok(());
        };
        if self.queue.skip(name) {
            info!("{} skipped by {}", name, self.remote.primary_address());
            self.skipped.push(name.to_string());
            if self.outbound.name() == Some(name) {
                self.outbound = Outbound::Idle;
            }
        } else {
            warn!("M_SKIP for {} which is not queued", name);
        }
        Ok(())
    }

    async fn on_get(&mut self, argument: &[u8]) -> BinkpResult<()> {
        let request = GetRequest::parse(argument).ok_or_else(|| malformed(CommandId::Get, argument))?;
        let name = match request.name_str() {
            Some(name) if self.queue.contains(name) => name.to_string(),
            _ => {
                warn!("M_GET for {} which is not queued", String::from_utf8_lossy(&request.name));
                return Ok(());
            }
        };

        // A suspended item is announced again from the start later.
        if let Some(current) = self.outbound.name().map(str::to_string) {
            if current != name {
                if let Some(item) = self.queue.get_mut(&current) {
                    item.rewind_to(0)?;
                }
            }
        }
        if let Some(item) = self.queue.get_mut(&name) {
            item.rewind_to(request.offset)
                .map_err(|_| malformed(CommandId::Get, argument))?;
        }
        self.outbound = Outbound::Idle;
        self.announce(&name).await
    }

    fn on_eob(&mut self) {
        self.eob_received = true;
        if let Inbound::Receiving(open) = mem::replace(&mut self.inbound, Inbound::Idle) {
            warn!(
                "remote ended batch with {} incomplete ({} of {} bytes), dropping it",
                open.info().display_name(),
                open.received(),
                open.info().size
            );
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn send_command(&mut self, id: CommandId, argument: impl Into<Vec<u8>>) -> BinkpResult<()> {
        let cmd = Command::new(id, argument);
        info!("send {}", cmd);
        write_frame(
            &mut self.transport,
            &Frame::Command(cmd),
            self.config.command_timeout,
        )
        .await
    }

    fn enter(&mut self, state: SessionState) {
        if self.state == state || self.state == SessionState::Terminated {
            return;
        }
        debug!("{}: {} -> {}", self.transport.peer(), self.state, state);
        self.state = state;
        self.history.push(state);
    }

    async fn terminate(&mut self) {
        if !self.partials.is_empty() {
            let names: Vec<_> = self
                .partials
                .keys()
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect();
            warn!("dropping partial files: {}", names.join(", "));
            self.partials.clear();
        }
        self.enter(SessionState::Terminated);
        self.transport.close().await;
    }

    /// Turn a failed step into a terminated session.
    async fn settle(&mut self, result: BinkpResult<()>) -> BinkpResult<()> {
        if let Err(err) = &result {
            warn!("session with {} failed: {}", self.transport.peer(), err);
            if let Some(reply) = err.reply() {
                if !self.transport.is_closed() {
                    let frame = Frame::command(reply, err.to_string());
                    match write_frame(&mut self.transport, &frame, FAREWELL_TIMEOUT).await {
                        Ok(()) => info!("send {}: {}", reply, err),
                        Err(e) => debug!("could not send {}: {}", reply, e),
                    }
                }
            }
            self.terminate().await;
        }
        result
    }
}

fn malformed(command: CommandId, argument: &[u8]) -> BinkpError {
    ProtocolError::MalformedArgument {
        command,
        argument: String::from_utf8_lossy(argument).into_owned(),
    }
    .into()
}
