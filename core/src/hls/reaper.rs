//! Background segment reaper
//!
//! Walks the HLS root bottom-up on an interval, unlinking `.ts` segments
//! older than the age threshold and pruning directories that end up empty.
//! Playlists, keys, and anything else stay untouched; this task is the only
//! deleter of segment files in the whole system.

use std::{
	path::Path,
	time::{Duration, SystemTime},
};

use tokio_util::sync::CancellationToken;

/// Segment file extension; nothing else is ever deleted
const SEGMENT_EXT: &str = "ts";

/// Outcome of one reap pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapStats {
	pub segments_removed: usize,
	pub dirs_removed: usize,
}

/// Run the reap loop until the cancellation token fires.
///
/// Each pass runs on the blocking pool; the loop itself never blocks the
/// runtime. Errors inside a pass are logged and never propagate.
pub async fn run(
	hls_root: std::path::PathBuf,
	interval_seconds: u64,
	age_seconds: u64,
	cancel: CancellationToken,
) {
	tracing::info!(
		root = %hls_root.display(),
		interval_seconds,
		age_seconds,
		"Starting HLS reaper"
	);

	let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => {
				tracing::info!("HLS reaper cancelled");
				return;
			}
			_ = interval.tick() => {
				let root = hls_root.clone();
				let age = Duration::from_secs(age_seconds);
				let pass = tokio::task::spawn_blocking(move || reap_once(&root, age)).await;

				match pass {
					Ok(stats) if stats.segments_removed > 0 || stats.dirs_removed > 0 => {
						tracing::debug!(
							segments = stats.segments_removed,
							dirs = stats.dirs_removed,
							"Reap pass completed"
						);
					}
					Ok(_) => {}
					Err(error) => tracing::error!(?error, "Reap pass panicked"),
				}
			}
		}
	}
}

/// Perform a single bottom-up pass over the HLS root.
pub fn reap_once(hls_root: &Path, age: Duration) -> ReapStats {
	let mut stats = ReapStats::default();
	let now = SystemTime::now();
	visit(hls_root, hls_root, now, age, &mut stats);
	stats
}

fn visit(dir: &Path, root: &Path, now: SystemTime, age: Duration, stats: &mut ReapStats) {
	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => return,
		Err(error) => {
			tracing::error!(?error, dir = %dir.display(), "Failed to read HLS directory");
			return;
		}
	};

	for entry in entries.flatten() {
		let path = entry.path();

		if path.is_dir() {
			visit(&path, root, now, age, stats);
			continue;
		}

		if path.extension().and_then(|ext| ext.to_str()) != Some(SEGMENT_EXT) {
			continue;
		}

		match segment_age(&path, now) {
			Some(file_age) if file_age > age => match std::fs::remove_file(&path) {
				Ok(()) => {
					stats.segments_removed += 1;
					tracing::debug!(path = %path.display(), "Removed expired segment");
				}
				// Racing with a concurrent delete is fine
				Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
				Err(error) => {
					tracing::error!(?error, path = %path.display(), "Failed to remove segment");
				}
			},
			_ => {}
		}
	}

	// Children first, then maybe this directory; the root always stays
	if dir != root {
		match std::fs::read_dir(dir) {
			Ok(mut remaining) => {
				if remaining.next().is_none() {
					match std::fs::remove_dir(dir) {
						Ok(()) => {
							stats.dirs_removed += 1;
							tracing::debug!(dir = %dir.display(), "Removed empty HLS directory");
						}
						Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
						Err(error) => {
							tracing::error!(?error, dir = %dir.display(), "Failed to remove directory");
						}
					}
				}
			}
			_ => {}
		}
	}
}

fn segment_age(path: &Path, now: SystemTime) -> Option<Duration> {
	let modified = std::fs::metadata(path).ok()?.modified().ok()?;
	now.duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn touch(path: &Path, contents: &[u8]) {
		fs::write(path, contents).unwrap();
	}

	fn age_file(path: &Path, seconds: u64) {
		let mtime = SystemTime::now() - Duration::from_secs(seconds);
		let times = fs::FileTimes::new().set_modified(mtime);
		let file = fs::File::options().write(true).open(path).unwrap();
		file.set_times(times).unwrap();
	}

	#[test]
	fn removes_only_expired_segments() {
		let tmp = tempfile::tempdir().unwrap();
		let track = tmp.path().join("track-1").join("abcd1234");
		fs::create_dir_all(&track).unwrap();

		let old_seg = track.join("seg_000.ts");
		let young_seg = track.join("seg_001.ts");
		let playlist = track.join("playlist.m3u8");
		let key_file = track.join("session.key");
		touch(&old_seg, b"old");
		touch(&young_seg, b"young");
		touch(&playlist, b"#EXTM3U");
		touch(&key_file, b"k");
		age_file(&old_seg, 3_600);
		age_file(&playlist, 3_600);
		age_file(&key_file, 3_600);

		let stats = reap_once(tmp.path(), Duration::from_secs(600));

		assert_eq!(stats.segments_removed, 1);
		assert!(!old_seg.exists());
		assert!(young_seg.exists());
		assert!(playlist.exists(), "playlists must never be reaped");
		assert!(key_file.exists(), "key files must never be reaped");
	}

	#[test]
	fn prunes_empty_directories_but_not_the_root() {
		let tmp = tempfile::tempdir().unwrap();
		let session_dir = tmp.path().join("track-1").join("abcd1234");
		fs::create_dir_all(&session_dir).unwrap();

		let seg = session_dir.join("seg_000.ts");
		touch(&seg, b"bytes");
		age_file(&seg, 3_600);

		let stats = reap_once(tmp.path(), Duration::from_secs(1));

		assert_eq!(stats.segments_removed, 1);
		// Session dir emptied, then its parent; the HLS root survives
		assert_eq!(stats.dirs_removed, 2);
		assert!(!session_dir.exists());
		assert!(tmp.path().exists());
	}

	#[test]
	fn missing_root_is_a_quiet_noop() {
		let tmp = tempfile::tempdir().unwrap();
		let missing = tmp.path().join("does-not-exist");

		let stats = reap_once(&missing, Duration::from_secs(600));
		assert_eq!(stats, ReapStats::default());
	}

	#[test]
	fn directory_with_surviving_manifest_is_retained() {
		let tmp = tempfile::tempdir().unwrap();
		let session_dir = tmp.path().join("track-1").join("abcd1234");
		fs::create_dir_all(&session_dir).unwrap();

		let seg = session_dir.join("seg_000.ts");
		let playlist = session_dir.join("playlist.m3u8");
		touch(&seg, b"bytes");
		touch(&playlist, b"#EXTM3U");
		age_file(&seg, 3_600);
		age_file(&playlist, 3_600);

		reap_once(tmp.path(), Duration::from_secs(1));

		assert!(!seg.exists());
		assert!(playlist.exists());
		assert!(session_dir.exists());
	}
}
