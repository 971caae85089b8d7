mod playback_flow;
mod watermark_attribution;
