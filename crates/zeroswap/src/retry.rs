use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Round-robin retry schedule over a list of endpoints.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Full passes over the endpoint list.
    pub rounds: usize,
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the random jitter added to each pause, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            rounds: 3,
            base: Duration::from_millis(400),
            cap: Duration::from_secs(4),
            jitter_ms: 250,
        }
    }
}

impl Backoff {
    /// Pause after failed round `round` (0-based): `base * 2^round`, capped, plus jitter.
    pub fn delay(&self, round: usize) -> Duration {
        let exp = u32::try_from(round.min(16)).unwrap_or(16);
        let factor = 1_u32.checked_shl(exp).unwrap_or(u32::MAX);
        let step = self.base.saturating_mul(factor).min(self.cap);
        let jitter = if cfg!(test) || self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>()
                .checked_rem(self.jitter_ms.saturating_add(1))
                .unwrap_or(0)
        };
        step.saturating_add(Duration::from_millis(jitter))
    }
}

/// Run `op` against each endpoint in order until one succeeds; after a full failed pass,
/// sleep per `backoff` and start over. The last error is returned, wrapped with `label`.
pub async fn first_success<I, T, Fut>(
    endpoints: &[I],
    backoff: &Backoff,
    mut op: impl FnMut(&I) -> Fut + Send,
    label: &'static str,
) -> eyre::Result<T>
where
    I: Sync,
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    if endpoints.is_empty() {
        eyre::bail!("{label}: no endpoints configured");
    }
    if backoff.rounds == 0 {
        eyre::bail!("{label}: backoff needs at least one round");
    }

    let mut last_err = None;
    for round in 0..backoff.rounds {
        for (idx, ep) in endpoints.iter().enumerate() {
            match op(ep).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    debug!(label, round, endpoint = idx, error = %e, "attempt failed");
                    last_err = Some(e);
                }
            }
        }
        if round.saturating_add(1) < backoff.rounds {
            tokio::time::sleep(backoff.delay(round)).await;
        }
    }

    Err(last_err
        .unwrap_or_else(|| eyre::eyre!("no attempt was made"))
        .wrap_err(label))
}
