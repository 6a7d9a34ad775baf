//! Protocol constants and runtime configuration.

/// Version stamped on every outbound message and checked on every inbound one.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error text stored on a trade or sent to the peer is cut to this many chars.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

pub const MAX_PAYMENT_ACCOUNT_DATA_LENGTH: usize = 1000;

/// Bitcoin address or lightning invoice.
pub const MAX_BTC_ADDRESS_LENGTH: usize = 1000;

/// Transaction id or preimage.
pub const MAX_PAYMENT_PROOF_LENGTH: usize = 1000;

/// Human readable prefix of generated network ids.
pub const NETWORK_ID_HRP: &str = "peer_";

/// What the service does with a peer message the current state cannot take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedMessagePolicy {
    /// Keep it and retry after each committed transition of the trade.
    #[default]
    Defer,
    /// Log and discard.
    Drop,
}

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    protocol_version: u32,
    unmatched_message_policy: UnmatchedMessagePolicy,
    max_deferred_messages: usize,
    max_pending_messages: usize,
    flush_on_commit: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            unmatched_message_policy: UnmatchedMessagePolicy::default(),
            max_deferred_messages: 32,
            max_pending_messages: 256,
            flush_on_commit: true,
        }
    }
}

impl ProtocolConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }
    pub fn set_unmatched_message_policy(mut self, policy: UnmatchedMessagePolicy) -> Self {
        self.unmatched_message_policy = policy;
        self
    }
    pub fn set_max_deferred_messages(mut self, max: usize) -> Self {
        self.max_deferred_messages = max;
        self
    }
    /// Total messages kept across all unknown trades.
    pub fn set_max_pending_messages(mut self, max: usize) -> Self {
        self.max_pending_messages = max;
        self
    }
    pub fn set_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
    pub fn unmatched_message_policy(&self) -> UnmatchedMessagePolicy {
        self.unmatched_message_policy
    }
    pub fn max_deferred_messages(&self) -> usize {
        self.max_deferred_messages
    }
    pub fn max_pending_messages(&self) -> usize {
        self.max_pending_messages
    }
    pub fn flush_on_commit(&self) -> bool {
        self.flush_on_commit
    }
}
