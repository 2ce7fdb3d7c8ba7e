use crate::error::MwApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T, MwApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MwApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(val) => return Ok(val),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let internal_secs =
                        self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
                    let internal_delay = internal_secs.min(self.max_delay.as_secs_f64());

                    // Honor server-requested retry_after for MaxLag and RateLimited
                    let server_delay = match &e {
                        MwApiError::MaxLag { retry_after } => *retry_after as f64,
                        MwApiError::RateLimited { retry_after } => *retry_after as f64,
                        _ => 0.0,
                    };

                    let effective_delay = internal_delay.max(server_delay);
                    let jitter = rand_jitter();
                    let delay = Duration::from_secs_f64(effective_delay + jitter);

                    warn!(attempt, ?delay, error = %e, "Retrying after error");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn rand_jitter() -> f64 {
    // Use rand crate for proper randomness
    use rand::Rng;
    rand::thread_rng().gen_range(0.0..1.0)
}
