//! Sizing of the server's Tokio runtime.

use std::{env, thread};
use tracing::warn;

/// Environment variable that controls the number of server worker threads.
pub const SERVER_THREADS_ENV: &str = "CALCNET_SERVER_THREADS";

/// Upper bound on worker threads, whatever the environment asks for.
pub const MAX_SERVER_THREADS: usize = 256;

/// Worker thread count for the server runtime.
///
/// Taken from [`SERVER_THREADS_ENV`] when it holds a positive integer, capped
/// at [`MAX_SERVER_THREADS`]. Otherwise the available parallelism is used and
/// an unusable value is reported.
pub fn server_worker_threads() -> usize {
    match env::var(SERVER_THREADS_ENV) {
        Ok(raw) => worker_threads(&raw).unwrap_or_else(|| {
            let fallback = available_threads();
            warn!("Ignoring {SERVER_THREADS_ENV}={raw:?}, using {fallback} worker threads");
            fallback
        }),
        Err(_) => available_threads(),
    }
}

fn available_threads() -> usize {
    thread::available_parallelism()
        .map_or(1, |n| n.get())
        .min(MAX_SERVER_THREADS)
}

fn worker_threads(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(requested) if requested > MAX_SERVER_THREADS => {
            warn!("{SERVER_THREADS_ENV}={requested} capped at {MAX_SERVER_THREADS}");
            Some(MAX_SERVER_THREADS)
        }
        Ok(requested) => Some(requested),
    }
}
