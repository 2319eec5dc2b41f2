//! Tuning constants for the transfer engine.

use std::time::Duration;

/// Logical chunk size clients are expected to use. The server never enforces
/// it at write time; the range engine walks actual stored sizes.
pub const CHUNK_SIZE: u64 = 8192 * 1024;

/// Number of chunk fetches kept in flight ahead of the write cursor during a
/// full-file download.
pub const DOWNLOAD_WINDOW: usize = 2;

/// Attempts per chunk before a download fails with an upstream error.
pub const DOWNLOAD_MAX_ATTEMPTS: u32 = 2;

/// Backoff between chunk fetch attempts for non-expiry failures.
pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-fetch timeout for chunk downloads.
pub const DOWNLOAD_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// The range engine refreshes URLs with less than this much lifetime left.
pub const STREAM_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Maximum message ids per bulk-delete API call.
pub const BULK_DELETE_BATCH: usize = 100;

/// Maximum attachment URLs per refresh API call.
pub const URL_REFRESH_BATCH: usize = 50;

/// Concurrency for the single-delete fallback when a bulk delete is rejected
/// (messages past the 14-day bulk cutoff).
pub const SINGLE_DELETE_CONCURRENCY: usize = 5;

/// Pause between single-delete waves to stay under upstream rate limits.
pub const SINGLE_DELETE_WAVE_PAUSE: Duration = Duration::from_millis(250);

/// Content prefix marking an index snapshot message in the backup channel.
pub const BACKUP_MARKER: &str = "neko-index snapshot";

/// How many recent backup-channel messages are scanned for stale snapshots.
pub const BACKUP_SCAN_LIMIT: u8 = 10;

/// Lifetime of the cached upstream health probe.
pub const DISCORD_HEALTH_TTL: Duration = Duration::from_secs(30);
