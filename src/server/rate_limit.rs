//! Per-user chat rate limiting

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Sliding-window limiter keyed by user id
///
/// # Examples
///
/// ```
/// use horizon::server::ChatRateLimiter;
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = ChatRateLimiter::new(1);
/// assert!(limiter.check_and_record("ada").await);
/// assert!(!limiter.check_and_record("ada").await);
/// assert!(limiter.check_and_record("grace").await);
/// # }
/// ```
#[derive(Debug)]
pub struct ChatRateLimiter {
    /// Maximum number of requests per window
    max_requests: u32,
    window: Duration,
    /// Request times per user, oldest first
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ChatRateLimiter {
    /// Create a limiter with a one-minute window
    ///
    /// # Arguments
    ///
    /// * `max_requests_per_minute` - Chat requests allowed per user per minute
    ///
    /// # Returns
    ///
    /// Returns a limiter with no recorded requests
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self::with_window(max_requests_per_minute, Duration::from_secs(60))
    }

    /// Create a limiter with a custom window length
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Requests allowed per user within one window
    /// * `window` - Length of the sliding window
    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `user_id` if it fits in the window
    ///
    /// Returns false, recording nothing, when the limit is already reached.
    pub async fn check_and_record(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;

        // Drop users whose whole history has aged out
        requests.retain(|_, times| {
            times
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });

        let times = requests.entry(user_id.to_string()).or_default();
        while times
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.max_requests as usize {
            tracing::warn!(
                "Rate limit exceeded for user {}: {} requests per {:?}",
                user_id,
                self.max_requests,
                self.window
            );
            return false;
        }

        times.push_back(now);
        true
    }
}
