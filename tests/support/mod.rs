//! Recording transport double shared by integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use contact_dispatch::{
    AckTemplate, Connector, Envelope, LogLevel, Mailbox, ProviderReceipt, ServiceConfig, Transport,
    TransportConfig, TransportError,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Everything the double observed, across all handles it opened.
#[derive(Debug, Default)]
pub struct Journal {
    pub opens: usize,
    pub verifies: usize,
    pub send_attempts: usize,
    pub closes: usize,
    pub sent: Vec<Envelope>,
    /// Failures the double produced, in order. The only place an
    /// acknowledgment failure shows up.
    pub failures: Vec<String>,
}

impl Journal {
    pub fn calls(&self) -> usize {
        self.opens + self.verifies + self.send_attempts
    }
}

/// Which operations fail, and how.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub open_error: Option<TransportError>,
    pub verify_error: Option<TransportError>,
    /// Keyed by the send index on a handle: 0 is the primary, 1 the acknowledgment.
    pub send_errors: HashMap<usize, TransportError>,
}

pub struct RecordingConnector {
    journal: Rc<RefCell<Journal>>,
    script: Script,
    next_receipt: Rc<Cell<u64>>,
}

impl RecordingConnector {
    pub fn new(script: Script) -> (Self, Rc<RefCell<Journal>>) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let connector = Self {
            journal: journal.clone(),
            script,
            next_receipt: Rc::new(Cell::new(1)),
        };
        (connector, journal)
    }

    pub fn succeeding() -> (Self, Rc<RefCell<Journal>>) {
        Self::new(Script::default())
    }

    pub fn failing_verify(error: TransportError) -> (Self, Rc<RefCell<Journal>>) {
        Self::new(Script {
            verify_error: Some(error),
            ..Default::default()
        })
    }

    pub fn failing_send(index: usize, error: TransportError) -> (Self, Rc<RefCell<Journal>>) {
        let mut send_errors = HashMap::new();
        send_errors.insert(index, error);
        Self::new(Script {
            send_errors,
            ..Default::default()
        })
    }
}

impl Connector for RecordingConnector {
    type Transport = RecordingTransport;

    fn open(&self, _config: &TransportConfig) -> Result<RecordingTransport, TransportError> {
        let mut journal = self.journal.borrow_mut();
        journal.opens += 1;
        if let Some(ref e) = self.script.open_error {
            journal.failures.push(format!("open: {}", e));
            return Err(e.clone());
        }
        Ok(RecordingTransport {
            journal: self.journal.clone(),
            script: self.script.clone(),
            next_receipt: self.next_receipt.clone(),
            sends: 0,
        })
    }
}

pub struct RecordingTransport {
    journal: Rc<RefCell<Journal>>,
    script: Script,
    next_receipt: Rc<Cell<u64>>,
    sends: usize,
}

#[async_trait(?Send)]
impl Transport for RecordingTransport {
    async fn verify(&mut self) -> Result<(), TransportError> {
        let mut journal = self.journal.borrow_mut();
        journal.verifies += 1;
        match self.script.verify_error {
            Some(ref e) => {
                journal.failures.push(format!("verify: {}", e));
                Err(e.clone())
            }
            None => Ok(()),
        }
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
        let index = self.sends;
        self.sends += 1;
        let mut journal = self.journal.borrow_mut();
        journal.send_attempts += 1;
        if let Some(e) = self.script.send_errors.get(&index) {
            journal
                .failures
                .push(format!("send #{} to {}: {}", index, envelope.to[0].email, e));
            return Err(e.clone());
        }
        journal.sent.push(envelope.clone());
        let n = self.next_receipt.get();
        self.next_receipt.set(n + 1);
        Ok(ProviderReceipt {
            message_id: format!("<receipt-{}@double.test>", n),
            response: Some("250 2.0.0 OK".to_string()),
        })
    }

    async fn close(&mut self) {
        self.journal.borrow_mut().closes += 1;
    }
}

pub fn config() -> ServiceConfig {
    ServiceConfig {
        transport: TransportConfig::new("smtp.double.test", 587),
        sender: Mailbox::new("contact@site.com"),
        default_recipient: None,
        allowed_origins: vec!["https://site.com".to_string()],
        log_level: LogLevel::None,
        ack: AckTemplate::default(),
    }
}
