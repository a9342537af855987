//! Partitioned prime search
//!
//! The number line is cut into fixed-size windows; task `i` searches
//! `[i * range, (i + 1) * range)`. Workers run `findPrimes` on one window;
//! the coordinator keeps a bounded number of windows in flight, gathers the
//! primes and sorts them (results arrive in completion order, not window
//! order).

use crate::commander::Commander;
use crate::config::JobConfig;
use crate::error::TaskError;
use crate::registry::CommandRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::task::JoinSet;

/// Command name workers register the search under
pub const FIND_PRIMES: &str = "findPrimes";

/// Arguments of one `findPrimes` task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindPrimesArgs {
    pub offset: u64,
    pub range: u64,
}

/// Result of one `findPrimes` task
///
/// Primes travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindPrimesResult {
    pub primes: Vec<String>,
}

/// Deterministic primality test by trial division over 6k ± 1
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    let mut i: u64 = 5;
    while i.checked_mul(i).map_or(false, |sq| sq <= n) {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Primes in `[offset, offset + range)`
pub fn find_primes(args: FindPrimesArgs) -> FindPrimesResult {
    let end = args.offset.saturating_add(args.range);
    let primes = (args.offset..end)
        .filter(|&n| is_prime(n))
        .map(|n| n.to_string())
        .collect();

    FindPrimesResult { primes }
}

/// Register `findPrimes` with a worker's registry
pub fn register(registry: &CommandRegistry) {
    registry.register_typed(FIND_PRIMES, |args: FindPrimesArgs| Ok(find_primes(args)));
}

/// Shape of a search run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPlan {
    /// Index of the last window; windows `0..=tasks` are searched
    pub tasks: u64,
    pub range: u64,
    /// Windows kept in flight at once
    pub buffered: usize,
}

impl From<&JobConfig> for SearchPlan {
    fn from(job: &JobConfig) -> Self {
        Self {
            tasks: job.tasks,
            range: job.range,
            buffered: job.buffered,
        }
    }
}

/// Outcome of a search run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchReport {
    /// All primes found, ascending
    pub primes: Vec<u64>,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

type WindowOutcome = (FindPrimesArgs, Result<FindPrimesResult, TaskError>);

fn submit_window(
    commander: &Commander,
    plan: SearchPlan,
    index: u64,
    in_flight: &mut JoinSet<WindowOutcome>,
) -> Result<()> {
    let args = FindPrimesArgs {
        offset: index
            .checked_mul(plan.range)
            .context("search window offset overflows u64")?,
        range: plan.range,
    };
    let pending = commander.submit_as::<_, FindPrimesResult>(FIND_PRIMES, &args)?;
    in_flight.spawn(async move { (args, pending.await) });
    Ok(())
}

/// Run a search through `commander`
///
/// Failed windows are logged and counted, not retried.
pub async fn search(commander: &Commander, plan: SearchPlan) -> Result<SearchReport> {
    let mut in_flight = JoinSet::new();
    let mut next: u64 = 0;
    let mut report = SearchReport::default();

    while next <= plan.tasks && in_flight.len() < plan.buffered.max(1) {
        submit_window(commander, plan, next, &mut in_flight)?;
        next += 1;
    }

    while let Some(joined) = in_flight.join_next().await {
        let (args, outcome) = joined.context("search task panicked")?;
        match outcome {
            Ok(result) => {
                for prime in &result.primes {
                    let value = prime
                        .parse::<u64>()
                        .with_context(|| format!("worker returned a non-numeric prime: {}", prime))?;
                    report.primes.push(value);
                }
                report.completed_tasks += 1;
                tracing::debug!(offset = args.offset, found = result.primes.len(), "window complete");
            }
            Err(e) => {
                report.failed_tasks += 1;
                tracing::error!(offset = args.offset, "window failed: {}", e);
            }
        }

        if next <= plan.tasks {
            submit_window(commander, plan, next, &mut in_flight)?;
            next += 1;
        }
    }

    report.primes.sort_unstable();
    report.primes.dedup();
    Ok(report)
}

/// Write primes one per line
pub fn write_primes(path: &Path, primes: &[u64]) -> Result<()> {
    let contents = primes
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write primes to {}", path.display()))
}
