//! H.264 backend using OpenH264
//!
//! OpenH264 encodes the constrained baseline profile, which has no B-frames:
//! it never holds frames back for reordering, so its effective reorder depth
//! is 0. It can still report "not ready" when rate control skips a frame.

use std::collections::VecDeque;

use openh264::encoder::{
    BitRate, Encoder, EncoderConfig, FrameRate, FrameType, IntraFramePeriod, RateControlMode, UsageType,
};
use openh264::formats::YUVSlices;
use openh264::OpenH264API;
use tracing::{debug, info, trace};

use super::compressor::{Compressor, Drain};
use super::convert::PlanarFrame;
use super::{CodecConfig, CodecError};

struct EncodedUnit {
    data: Vec<u8>,
    pts: u64,
    keyframe: bool,
}

/// OpenH264 encoder state owned by one session
pub struct OpenH264Compressor {
    encoder: Encoder,
    width: usize,
    height: usize,
    pending: VecDeque<EncodedUnit>,
}

impl OpenH264Compressor {
    pub fn new(config: &CodecConfig) -> Result<Self, CodecError> {
        let encoder_config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(config.bitrate))
            .max_frame_rate(FrameRate::from_hz(config.fps as f32))
            .rate_control_mode(RateControlMode::Bitrate)
            .usage_type(UsageType::CameraVideoRealTime)
            .intra_frame_period(IntraFramePeriod::from_num_frames(config.keyframe_interval));

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| CodecError::Configuration(format!("OpenH264 open failed: {}", e)))?;

        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate = config.bitrate,
            gop = config.keyframe_interval,
            "OpenH264 encoder opened"
        );
        if config.max_b_frames > 0 {
            debug!(
                max_b_frames = config.max_b_frames,
                "baseline profile emits no B-frames; reorder depth is 0"
            );
        }

        Ok(Self {
            encoder,
            width: config.width as usize,
            height: config.height as usize,
            pending: VecDeque::new(),
        })
    }
}

impl Compressor for OpenH264Compressor {
    fn name(&self) -> &'static str {
        "openh264"
    }

    fn submit(&mut self, frame: &PlanarFrame, pts: u64) -> Result<(), CodecError> {
        let (w, h) = (self.width, self.height);
        let yuv = YUVSlices::new(
            (frame.y_plane(), frame.u_plane(), frame.v_plane()),
            (w, h),
            (w, w / 2, w / 2),
        );

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| CodecError::Encode(format!("OpenH264 encode failed: {}", e)))?;

        let data = bitstream.to_vec();
        if data.is_empty() {
            trace!(pts, "frame skipped by rate control");
            return Ok(());
        }

        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        self.pending.push_back(EncodedUnit { data, pts, keyframe });
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> Result<Drain, CodecError> {
        match self.pending.pop_front() {
            Some(unit) => {
                out.extend_from_slice(&unit.data);
                trace!(pts = unit.pts, bytes = unit.data.len(), keyframe = unit.keyframe, "access unit drained");
                Ok(Drain::Ready {
                    pts: unit.pts,
                    keyframe: unit.keyframe,
                })
            }
            None => Ok(Drain::NotReady),
        }
    }

    fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
        debug!("Forced keyframe on next encode");
    }
}
