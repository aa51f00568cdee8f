mod abuse;

pub use abuse::{
    AbuseControl,
    AbuseDecision,
    BotDetector,
    FixedWindowLimiter,
    HeuristicBotDetector,
    PermissiveBotDetector,
    RequestFingerprint,
};
