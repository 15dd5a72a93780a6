// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted socket transport.
//!
//! [`MockDialer`] is scripted per dial: each queued outcome either rejects
//! with a chosen error or accepts and hands the test a [`LinkHandle`] for
//! driving the resulting [`MockLink`] from the outside.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use stagelink_core::{SocketDialer, SocketLink, StagelinkError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test-side controller for one [`MockLink`].
#[derive(Clone)]
pub struct LinkHandle {
    inbound: mpsc::UnboundedSender<Result<String, StagelinkError>>,
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<AtomicU32>,
    closed: Arc<AtomicBool>,
}

impl LinkHandle {
    /// Deliver a text frame to the link's reader.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(text.into()));
    }

    /// Deliver a transport error, which reads as an abrupt close.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self.inbound.send(Err(StagelinkError::transport(message)));
    }

    /// Close the inbound side cleanly (reader observes end of stream).
    pub fn close_inbound(&self) {
        // Dropping the only sender ends the stream; simulate by sending
        // nothing more. The handle keeps a sender, so close explicitly.
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Everything the code under test sent, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A scripted [`SocketLink`].
pub struct MockLink {
    inbound: mpsc::UnboundedReceiver<Result<String, StagelinkError>>,
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<AtomicU32>,
    closed: Arc<AtomicBool>,
    fail_sends: bool,
}

impl MockLink {
    /// A connected link plus the handle that drives it.
    pub fn pair() -> (MockLink, LinkHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let pings = Arc::new(AtomicU32::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        (
            MockLink {
                inbound: rx,
                sent: sent.clone(),
                pings: pings.clone(),
                closed: closed.clone(),
                fail_sends: false,
            },
            LinkHandle {
                inbound: tx,
                sent,
                pings,
                closed,
            },
        )
    }

    /// Make every write fail (abrupt close on send).
    pub fn fail_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }
}

#[async_trait]
impl SocketLink for MockLink {
    async fn send_text(&mut self, text: String) -> Result<(), StagelinkError> {
        if self.fail_sends || self.closed.load(Ordering::SeqCst) {
            return Err(StagelinkError::transport("mock link write failed"));
        }
        lock(&self.sent).push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, StagelinkError>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        tokio::select! {
            next = self.inbound.recv() => next,
            _ = wait_closed(&self.closed) => None,
        }
    }

    async fn ping(&mut self) -> Result<(), StagelinkError> {
        if self.fail_sends || self.closed.load(Ordering::SeqCst) {
            return Err(StagelinkError::transport("mock link ping failed"));
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

async fn wait_closed(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

enum DialOutcome {
    Reject(StagelinkError),
    Accept(MockLink),
}

/// Scripted [`SocketDialer`]: queue outcomes with [`accept`](Self::accept) /
/// [`reject`](Self::reject) before the code under test dials.
#[derive(Default)]
pub struct MockDialer {
    script: Mutex<VecDeque<DialOutcome>>,
    dials: Mutex<Vec<(String, String)>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next dial to succeed; returns the handle for the link the
    /// code under test will receive.
    pub fn accept(&self) -> LinkHandle {
        let (link, handle) = MockLink::pair();
        lock(&self.script).push_back(DialOutcome::Accept(link));
        handle
    }

    /// Script the next dial to fail with `error`.
    pub fn reject(&self, error: StagelinkError) {
        lock(&self.script).push_back(DialOutcome::Reject(error));
    }

    /// Script an auth rejection, the shape the refresh flow keys on.
    pub fn reject_auth(&self, message: impl Into<String>) {
        self.reject(StagelinkError::Auth {
            message: message.into(),
            source: None,
        });
    }

    /// Every `(url, token)` pair dialed so far.
    pub fn dials(&self) -> Vec<(String, String)> {
        lock(&self.dials).clone()
    }

    pub fn dial_count(&self) -> usize {
        lock(&self.dials).len()
    }
}

#[async_trait]
impl SocketDialer for MockDialer {
    async fn dial(&self, url: &str, token: &str) -> Result<Box<dyn SocketLink>, StagelinkError> {
        lock(&self.dials).push((url.to_string(), token.to_string()));
        match lock(&self.script).pop_front() {
            Some(DialOutcome::Accept(link)) => Ok(Box::new(link)),
            Some(DialOutcome::Reject(error)) => Err(error),
            None => Err(StagelinkError::transport("no scripted dial outcome")),
        }
    }
}
