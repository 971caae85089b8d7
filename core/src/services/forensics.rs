//! Offline leak attribution
//!
//! Given a candidate recording, correlate it against every session the
//! watermark registry has seen and report which render it came from. This
//! is an admin-side tool; nothing in the HTTP surface reaches it.

use std::sync::Arc;

use crate::{
	context::{Ctx, WatermarkRecord},
	crypto::watermark::{self, PcmAudio},
	error::CoreResult,
};

/// A traced leak: the registry record plus the correlation that matched it
#[derive(Debug, Clone)]
pub struct Attribution {
	pub record: WatermarkRecord,
	pub correlation: f64,
}

/// Identify which registered session produced a leaked recording.
pub async fn identify_session(ctx: &Arc<Ctx>, pcm: &PcmAudio) -> CoreResult<Option<Attribution>> {
	let sessions = ctx.watermarks.session_ids().await;
	if sessions.is_empty() {
		return Ok(None);
	}

	let best = watermark::detect(pcm, sessions.iter().map(String::as_str))?;

	let Some(found) = best else {
		return Ok(None);
	};

	let record = ctx.watermarks.find(&found.session_id).await;
	Ok(record.map(|record| Attribution {
		record,
		correlation: found.correlation,
	}))
}
