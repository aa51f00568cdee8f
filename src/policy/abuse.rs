use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::gateway::DenialReason;

/// Request attributes the abuse checks can see. Authentication happens
/// upstream; the identity here is already verified.
#[derive(Debug, Clone, Default)]
pub struct RequestFingerprint {
    pub user_agent: Option<String>,
    pub client_addr: Option<String>,
}

impl RequestFingerprint {
    pub fn with_user_agent(agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(agent.into()),
            client_addr: None,
        }
    }
}

/// Verdict of the combined abuse checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseDecision {
    Allow,
    Deny(DenialReason),
}

/// Bot classification over a request fingerprint.
pub trait BotDetector: Send + Sync {
    fn is_bot(&self, fingerprint: &RequestFingerprint) -> bool;
}

/// Flags missing user agents and the common automation strings. Stands in
/// for the managed detection service the production deployment delegates to.
pub struct HeuristicBotDetector {
    markers: Vec<&'static str>,
}

impl Default for HeuristicBotDetector {
    fn default() -> Self {
        Self {
            markers: vec!["bot", "crawler", "spider", "curl", "wget", "python-requests"],
        }
    }
}

impl BotDetector for HeuristicBotDetector {
    fn is_bot(&self, fingerprint: &RequestFingerprint) -> bool {
        match &fingerprint.user_agent {
            None => true,
            Some(agent) => {
                let agent = agent.to_ascii_lowercase();
                agent.is_empty() || self.markers.iter().any(|m| agent.contains(m))
            }
        }
    }
}

/// Lets everything through; for tests and trusted in-process callers.
pub struct PermissiveBotDetector;

impl BotDetector for PermissiveBotDetector {
    fn is_bot(&self, _fingerprint: &RequestFingerprint) -> bool {
        false
    }
}

struct WindowState {
    started: Instant,
    count: u32,
}

/// Fixed-window rate limiter, counted per identity.
///
/// The allow decision and the counter increment happen under one lock, so a
/// denied request can never slip a credential through. Once the map grows
/// past `SWEEP_THRESHOLD` identities, lapsed windows are evicted so memory
/// stays bounded by the set of identities active within one window.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, WindowState>>,
}

const SWEEP_THRESHOLD: usize = 256;

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().len()
    }

    /// Record one request for `identity`; returns whether it is allowed.
    pub fn check(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, state| now.duration_since(state.started) < window);
        }

        let state = windows
            .entry(identity.to_string())
            .or_insert(WindowState { started: now, count: 0 });

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= self.max_requests {
            return false;
        }

        state.count += 1;
        true
    }
}

/// Combined bot-detection and rate-limiting policy, injected into each
/// gateway operation so tests can substitute a permissive one.
pub struct AbuseControl {
    bot: Box<dyn BotDetector>,
    limiter: FixedWindowLimiter,
}

impl AbuseControl {
    pub fn new(bot: Box<dyn BotDetector>, limiter: FixedWindowLimiter) -> Self {
        Self { bot, limiter }
    }

    /// Default production policy: heuristic bot detection, 5 requests per
    /// 60-second window per identity.
    pub fn standard() -> Self {
        Self::new(
            Box::new(HeuristicBotDetector::default()),
            FixedWindowLimiter::new(5, Duration::from_secs(60)),
        )
    }

    /// Policy that denies nothing; for tests.
    pub fn permissive() -> Self {
        Self::new(
            Box::new(PermissiveBotDetector),
            FixedWindowLimiter::new(u32::MAX, Duration::from_secs(60)),
        )
    }

    /// Evaluate both checks for one request. Bot detection runs first so a
    /// flagged caller does not consume rate-limit budget.
    pub fn evaluate(&self, identity: &str, fingerprint: &RequestFingerprint) -> AbuseDecision {
        if self.bot.is_bot(fingerprint) {
            return AbuseDecision::Deny(DenialReason::Bot);
        }

        if !self.limiter.check(identity) {
            return AbuseDecision::Deny(DenialReason::RateLimited);
        }

        AbuseDecision::Allow
    }
}
