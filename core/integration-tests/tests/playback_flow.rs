//! End-to-end core flow: upload, authorize, package, resolve keys.

extern crate sectify_core;

use std::net::IpAddr;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sectify_core::{
	auth::{AuthorizationService, Operation},
	config::SectifyConfig,
	crypto::watermark::{PcmAudio, SAMPLE_RATE},
	error::CoreError,
	hls::{packager::decrypt_segment, AliasResolution},
	services::{ingest, playback},
	Ctx,
};

fn test_ctx() -> (Arc<Ctx>, TempDir) {
	let tmp = TempDir::new().expect("tmp dir");
	let mut config = SectifyConfig::debug();
	config.upload_root = tmp.path().join("uploads");
	config.hls_root = tmp.path().join("hls");
	(Ctx::new(config).expect("ctx").arced(), tmp)
}

fn tone(seconds: f64) -> PcmAudio {
	let frames = (seconds * SAMPLE_RATE as f64) as usize;
	let samples = (0..frames)
		.map(|n| {
			let t = n as f64 / SAMPLE_RATE as f64;
			((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 10_000.0) as i16
		})
		.collect();
	PcmAudio {
		sample_rate: SAMPLE_RATE,
		channels: 1,
		samples,
	}
}

#[tokio::test]
async fn upload_yields_uuid_and_sealed_envelope() {
	let (ctx, _tmp) = test_ctx();

	let track = ingest::ingest_upload(&ctx, "user-a", "Alpha", b"source audio".to_vec())
		.await
		.expect("ingest");

	let parsed = Uuid::parse_str(&track.track_id).expect("track id is a UUID");
	assert_eq!(parsed.get_version_num(), 4);

	let envelope_path = track.ciphertext_path.clone();
	assert!(envelope_path.ends_with(format!("{}.enc", track.track_id)));

	let envelope = std::fs::read(envelope_path).expect("envelope on disk");
	assert_eq!(&envelope[..5], &[0x53, 0x45, 0x43, 0x01, 0x01]);
	// No plaintext audio anywhere in the blob
	assert!(!envelope
		.windows(b"source audio".len())
		.any(|window| window == b"source audio"));
}

#[tokio::test]
async fn private_track_is_sealed_against_other_users() {
	let (ctx, _tmp) = test_ctx();
	let track = ingest::ingest_upload(&ctx, "user-a", "Private", b"blob".to_vec())
		.await
		.expect("ingest");

	// Every operation by a stranger is denied, and the denial shape does
	// not reveal whether the track exists
	for operation in [
		Operation::Read,
		Operation::Stream,
		Operation::Write,
		Operation::Delete,
	] {
		let result = AuthorizationService::check_track_access(
			&ctx.tracks,
			&ctx.grants,
			&track.track_id,
			Some("user-b"),
			operation,
			None,
		)
		.await;
		assert!(matches!(result, Err(CoreError::Forbidden)));
	}

	// Anonymous gets 401-shaped denial instead
	let result = AuthorizationService::check_track_access(
		&ctx.tracks,
		&ctx.grants,
		&track.track_id,
		None,
		Operation::Stream,
		None,
	)
	.await;
	assert!(matches!(result, Err(CoreError::AuthRequired)));
}

#[tokio::test]
async fn full_playback_flow_with_alias_binding() {
	let (ctx, _tmp) = test_ctx();

	let track = ingest::ingest_upload(&ctx, "user-a", "Public", b"blob".to_vec())
		.await
		.expect("ingest");
	ctx.tracks
		.update(&track.track_id, None, Some(true))
		.await
		.expect("publish");
	let track = ctx.tracks.find_by_id(&track.track_id).await.expect("reload");

	let minting_ip: IpAddr = "192.168.0.1".parse().unwrap();
	let (track, grant) = AuthorizationService::check_track_access(
		&ctx.tracks,
		&ctx.grants,
		&track.track_id,
		None,
		Operation::Stream,
		Some(minting_ip),
	)
	.await
	.expect("anonymous stream of a public track");

	let render = playback::package_pcm_render(
		&ctx,
		&track,
		&grant,
		tone(9.0),
		CancellationToken::new(),
	)
	.await
	.expect("package");

	// Manifest invariants: one key line, 32-hex alias, session-bound
	// segment URIs
	let key_lines: Vec<&str> = render
		.playlist
		.lines()
		.filter(|line| line.starts_with("#EXT-X-KEY"))
		.collect();
	assert_eq!(key_lines.len(), 1);
	assert_eq!(render.alias.len(), 32);
	assert!(render.alias.chars().all(|c| c.is_ascii_hexdigit()));
	assert!(key_lines[0].contains(&format!("/api/v1/stream/key/{}", render.alias)));
	assert!(render
		.playlist
		.contains(&format!("session={}", grant.session_id)));

	// Same-IP alias resolution returns the key that decrypts segments
	let same_ip_hash = ctx.tokens.ip_hash_raw(&minting_ip);
	let key = match ctx
		.aliases
		.resolve(&render.alias, Some(same_ip_hash), None)
		.await
	{
		AliasResolution::Key(key) => key,
		other => panic!("expected key, got {other:?}"),
	};

	let segment = playback::read_segment(&render, 0).await.expect("segment bytes");
	let plaintext = decrypt_segment(&key, 0, &segment).expect("segment decrypts");
	assert!(!plaintext.is_empty());

	// Cross-network fetch is denied even though the alias exists
	let foreign_ip: IpAddr = "10.0.0.1".parse().unwrap();
	let foreign_hash = ctx.tokens.ip_hash_raw(&foreign_ip);
	assert!(matches!(
		ctx.aliases.resolve(&render.alias, Some(foreign_hash), None).await,
		AliasResolution::Denied
	));
}

#[tokio::test]
async fn revocation_kills_grants_and_sessions() {
	let (ctx, _tmp) = test_ctx();

	let session = ctx.sessions.create("user-a", 30).await;
	ctx.grants
		.mint("11111111-2222-3333-4444-555555555555", Some("user-a"), Operation::Stream, None)
		.await;

	let revoked = ctx.revoke_user_sessions("user-a").await;
	assert!(revoked >= 1);
	assert!(!ctx.sessions.is_active(&session.session_id).await);
}

#[tokio::test]
async fn deleting_a_track_removes_everything() {
	let (ctx, _tmp) = test_ctx();

	let track = ingest::ingest_upload(&ctx, "user-a", "Doomed", b"blob".to_vec())
		.await
		.expect("ingest");
	let grant = ctx
		.grants
		.mint(&track.track_id, Some("user-a"), Operation::Stream, None)
		.await;

	let render = playback::package_pcm_render(
		&ctx,
		&track,
		&grant,
		tone(5.0),
		CancellationToken::new(),
	)
	.await
	.expect("package");
	assert!(render.dir.exists());

	ingest::delete_track(&ctx, &track.track_id).await.expect("delete");

	assert!(ctx.tracks.find_by_id(&track.track_id).await.is_none());
	assert!(!track.ciphertext_path.exists());
	assert!(!render.dir.exists());
	assert!(matches!(
		ctx.aliases.resolve(&render.alias, None, None).await,
		AliasResolution::NotFound
	));
}
