use core::time::Duration;

use rand::{Rng, seq::IndexedRandom};
use reqwest::Client;

pub static USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

pub fn basic() -> reqwest::Result<Client> {
    let user_agent = *USER_AGENTS
        .choose(&mut rand::rng())
        .unwrap_or(&USER_AGENTS[0]);
    tracing::info!(target: "scrape", "choosing user-agent \x1b[1;36m{user_agent}\x1b[0m ...");

    Client::builder()
        .connect_timeout(const { Duration::from_secs(8) })
        .timeout(const { Duration::from_secs(10) })
        .user_agent(user_agent)
        .build()
}

// min(60, 2^attempt) seconds, scaled by jitter in [0.5, 1.5).
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = (1u64 << attempt.min(6)).min(60);
    Duration::from_secs_f64(base as f64 * rand::rng().random_range(0.5..1.5))
}

pub async fn backoff(attempt: u32) {
    let delay = backoff_delay(attempt);
    tracing::debug!(target: "scrape", "backing off {}ms", delay.as_millis());
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_within_jitter_bounds() {
        for attempt in [0, 1, 3, 5] {
            let base = (1u64 << attempt) as f64;
            for _ in 0..32 {
                let d = backoff_delay(attempt).as_secs_f64();
                assert!(d >= base * 0.5, "attempt {attempt}: {d}");
                assert!(d <= base * 1.5, "attempt {attempt}: {d}");
            }
        }
    }

    #[test]
    fn backoff_delay_caps_at_a_minute() {
        for attempt in [6, 7, 31, u32::MAX] {
            let d = backoff_delay(attempt).as_secs_f64();
            assert!(d >= 30.0, "attempt {attempt}: {d}");
            assert!(d <= 90.0, "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn client_builds() {
        assert!(basic().is_ok());
    }
}
