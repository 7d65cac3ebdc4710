/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// Server
pub const DEFAULT_PORT: u16 = 3001;

// Session transport
pub const SESSION_HEADER: &str = "x-session-id";
pub const MAX_SESSION_ID_LEN: usize = 128;

// Completion service
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_CLASSIFIER_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_GENERATOR_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 20_000;

// Ledger
pub const DEFAULT_TOKEN_SYMBOL: &str = "ASTR";
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 60_000;
pub const CALL_TRANSFER_KEEP_ALIVE: &str = "balances.transferKeepAlive";
pub const CALL_TRANSFER_ALLOW_DEATH: &str = "balances.transferAllowDeath";

// Confirmation handshake
pub const CONFIRM_KEYWORD: &str = "CONFIRM";
pub const DEFAULT_PENDING_TRANSFER_TTL_SECS: u64 = 300;

// Session store
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3_600;
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
pub const MAX_TRANSACTION_HISTORY: usize = 50;
pub const ACCOUNT_CONTEXT_RECENT_TRANSACTIONS: usize = 5;

// Rate limits
pub const DEFAULT_RATE_LIMIT_PER_WINDOW: u32 = 30;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_CLIENT_RATE_LIMIT_PER_WINDOW: u32 = 120;

// Replies
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't understand that request. Try asking about your account, the network, smart contracts, or say something like \"send 10 ASTR to <address>\".";
pub const NOTHING_TO_CONFIRM_REPLY: &str =
    "There is no pending transaction to confirm. Describe the transfer you want to make first.";
pub const EXPIRED_TRANSFER_REPLY: &str =
    "Your pending transaction expired before it was confirmed. Send the transfer request again to get a fresh confirmation prompt.";
