#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use trace_confirm::stream::{MemoryTransport, StaticCredentials};
use trace_confirm::{
    presentation_channel, ConfirmConfig, ConfirmationController, MatchingAction, PresentationFeed,
    PresenterEvent, RenderView, SignOptions, SignedTransaction, SigningError, StreamMessage,
    TransactionEnvelope, TransactionId, TransactionTrace, WalletProvider,
};

pub const TARGET_ID: &str = "abcdefgh12345678ijklmnop";

/// Wallet that hands out queued results in order.
pub struct ScriptedWallet {
    results: Mutex<VecDeque<Result<String, SigningError>>>,
    pub envelopes: Mutex<Vec<TransactionEnvelope>>,
}

impl ScriptedWallet {
    pub fn new(results: Vec<Result<String, SigningError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            envelopes: Mutex::new(Vec::new()),
        })
    }

    pub fn signing(ids: &[&str]) -> Arc<Self> {
        Self::new(ids.iter().map(|id| Ok((*id).to_string())).collect())
    }
}

impl WalletProvider for ScriptedWallet {
    fn account_name(&self) -> Result<String, SigningError> {
        Ok("eosio.alice".to_string())
    }

    fn sign_transaction(
        &self,
        envelope: &TransactionEnvelope,
        _options: SignOptions,
    ) -> Result<SignedTransaction, SigningError> {
        self.envelopes.lock().unwrap().push(envelope.clone());
        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SigningError::Rejected {
                reason: "no scripted result".to_string(),
            }));
        next.map(|id| SignedTransaction {
            transaction_id: TransactionId::new(id),
        })
    }
}

pub fn fast_config() -> ConfirmConfig {
    let mut cfg = ConfirmConfig::default();
    cfg.stream.poll_interval = Duration::from_millis(5);
    cfg.stream.reconnect_base_delay = Duration::from_millis(1);
    cfg.stream.reconnect_max_delay = Duration::from_millis(10);
    cfg.stream.max_reconnect_attempts = 5;
    cfg
}

pub fn controller_with(
    transport: &MemoryTransport,
    cfg: ConfirmConfig,
) -> (ConfirmationController, PresentationFeed) {
    let (presenter, feed) = presentation_channel(1024);
    let controller = ConfirmationController::new(
        cfg,
        Arc::new(transport.clone()),
        Arc::new(StaticCredentials::new("test-token")),
        Arc::new(presenter),
    );
    (controller, feed)
}

pub fn hook_event(id: &str, data: &str) -> StreamMessage {
    StreamMessage::new(TransactionTrace::new(
        id,
        vec![MatchingAction {
            account: "dfuseiohooks".to_string(),
            name: "event".to_string(),
            json: json!({ "auth_key": "", "data": data }),
        }],
    ))
}

/// Pump controller events until `done` holds or the deadline passes.
pub fn pump_until(
    controller: &mut ConfirmationController,
    timeout: Duration,
    mut done: impl FnMut(&ConfirmationController) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done(controller) {
            return true;
        }
        controller.wait_for_event(Duration::from_millis(10));
    }
    done(controller)
}

/// Views published so far, in order.
pub fn views(feed: &PresentationFeed) -> Vec<RenderView> {
    feed.drain()
        .into_iter()
        .filter_map(|event| match event {
            PresenterEvent::Update(update) => Some(update.view),
            PresenterEvent::LoginRequested => None,
        })
        .collect()
}
