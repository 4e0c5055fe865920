//! Codec session: raw frames in, compressed access units out
//!
//! A [`CodecSession`] owns the compressor, a reusable planar frame and a
//! reusable packet buffer. It moves through
//! `Uninitialized → Initialized → Closed`; a failed init or an encoder fault
//! also lands in `Closed`, which is terminal. Resources are released exactly
//! once, either by [`CodecSession::close`] or on drop.

mod compressor;
pub mod convert;
#[cfg(feature = "h264")]
mod h264;

pub use compressor::{open_compressor, Compressor, Drain, RawCompressor, SUPPORTED_CODECS};
pub use convert::PlanarFrame;
#[cfg(feature = "h264")]
pub use h264::OpenH264Compressor;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::capture::RawFrame;

pub const DEFAULT_CODEC: &str = "h264";
pub const DEFAULT_BITRATE: u32 = 4_000_000;
pub const DEFAULT_KEYFRAME_INTERVAL: u32 = 10;
pub const DEFAULT_MAX_B_FRAMES: u32 = 1;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Unsupported codec, bad parameters, failed open, or use in the wrong state
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable compressor fault
    #[error("encode error: {0}")]
    Encode(String),

    /// Working buffer allocation failed
    #[error("resource error: {0}")]
    Resource(String),
}

/// Encoder parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Frames between keyframes (GOP size)
    pub keyframe_interval: u32,
    /// Maximum consecutive B-frames the encoder may hold back
    pub max_b_frames: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            bitrate: DEFAULT_BITRATE,
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            max_b_frames: DEFAULT_MAX_B_FRAMES,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(CodecError::Configuration(format!(
                "width and height must be non-zero and even, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(CodecError::Configuration("fps must be > 0".to_string()));
        }
        if self.bitrate == 0 {
            return Err(CodecError::Configuration("bitrate must be > 0".to_string()));
        }
        if self.keyframe_interval == 0 {
            return Err(CodecError::Configuration("keyframe interval must be > 0".to_string()));
        }
        Ok(())
    }
}

/// One compressed output unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Bytes,
    /// Presentation timestamp assigned when the frame was submitted
    pub pts: u64,
    pub keyframe: bool,
}

impl AccessUnit {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Closed,
}

/// Owner of one compressor and its working buffers
pub struct CodecSession {
    config: CodecConfig,
    state: SessionState,
    compressor: Option<Box<dyn Compressor>>,
    planar: Option<PlanarFrame>,
    packet: Vec<u8>,
    next_pts: u64,
    units_produced: u64,
}

impl CodecSession {
    /// Creates an uninitialized session
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            state: SessionState::Uninitialized,
            compressor: None,
            planar: None,
            packet: Vec::new(),
            next_pts: 0,
            units_produced: 0,
        }
    }

    /// Opens the compressor named by `codec_id` and allocates buffers
    pub fn init(&mut self, codec_id: &str) -> Result<(), CodecError> {
        self.ensure_uninitialized()?;

        let opened = self
            .config
            .validate()
            .and_then(|_| open_compressor(codec_id, &self.config));

        match opened {
            Ok(compressor) => self.install(compressor),
            Err(e) => {
                error!(codec = codec_id, error = %e, "Codec session init failed");
                self.close();
                Err(e)
            }
        }
    }

    /// Initializes the session around a caller-provided compressor
    pub fn init_with_compressor(&mut self, compressor: Box<dyn Compressor>) -> Result<(), CodecError> {
        self.ensure_uninitialized()?;

        if let Err(e) = self.config.validate() {
            self.close();
            return Err(e);
        }
        self.install(compressor)
    }

    fn ensure_uninitialized(&self) -> Result<(), CodecError> {
        match self.state {
            SessionState::Uninitialized => Ok(()),
            SessionState::Initialized => Err(CodecError::Configuration(
                "codec session is already initialized".to_string(),
            )),
            SessionState::Closed => Err(CodecError::Configuration("codec session is closed".to_string())),
        }
    }

    fn install(&mut self, compressor: Box<dyn Compressor>) -> Result<(), CodecError> {
        let buffers = PlanarFrame::allocate(self.config.width, self.config.height).and_then(|planar| {
            let capacity = planar.as_bytes().len();
            self.packet.try_reserve_exact(capacity).map_err(|e| {
                CodecError::Resource(format!("cannot allocate {} byte packet buffer: {}", capacity, e))
            })?;
            Ok(planar)
        });

        let planar = match buffers {
            Ok(planar) => planar,
            Err(e) => {
                error!(error = %e, "Codec session buffer allocation failed");
                drop(compressor);
                self.close();
                return Err(e);
            }
        };

        info!(
            codec = compressor.name(),
            resolution = %format!("{}x{}", self.config.width, self.config.height),
            fps = self.config.fps,
            bitrate = self.config.bitrate,
            gop = self.config.keyframe_interval,
            max_b_frames = self.config.max_b_frames,
            "Codec session initialized"
        );

        self.compressor = Some(compressor);
        self.planar = Some(planar);
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Converts, submits and drains one frame
    ///
    /// Returns `Ok(None)` when the compressor is still buffering input. The
    /// presentation timestamp counter advances on every call that reaches the
    /// compressor, whether or not a unit comes out. An encoder fault closes
    /// the session.
    pub fn encode_frame(&mut self, frame: &RawFrame) -> Result<Option<AccessUnit>, CodecError> {
        if self.state != SessionState::Initialized {
            return Err(CodecError::Configuration(format!(
                "encode_frame called on a {:?} codec session",
                self.state
            )));
        }

        let (Some(compressor), Some(planar)) = (self.compressor.as_mut(), self.planar.as_mut()) else {
            return Err(CodecError::Configuration("codec session has no compressor".to_string()));
        };

        planar.fill_from(frame)?;

        let pts = self.next_pts;
        self.next_pts += 1;

        self.packet.clear();
        let drained = compressor
            .submit(planar, pts)
            .and_then(|_| compressor.drain(&mut self.packet));

        match drained {
            Ok(Drain::NotReady) => {
                debug!(pts, "compressor not ready");
                Ok(None)
            }
            Ok(Drain::Ready { pts, keyframe }) => {
                self.units_produced += 1;
                Ok(Some(AccessUnit {
                    data: Bytes::copy_from_slice(&self.packet),
                    pts,
                    keyframe,
                }))
            }
            Err(e) => {
                error!(pts, error = %e, "Compressor fault, closing codec session");
                self.close();
                Err(e)
            }
        }
    }

    /// Asks the compressor to make the next unit a keyframe
    pub fn force_keyframe(&mut self) -> Result<(), CodecError> {
        match self.compressor.as_mut() {
            Some(compressor) if self.state == SessionState::Initialized => {
                compressor.force_keyframe();
                Ok(())
            }
            _ => Err(CodecError::Configuration("codec session is not initialized".to_string())),
        }
    }

    /// Releases the compressor and buffers; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(compressor) = self.compressor.take() {
            info!(
                codec = compressor.name(),
                frames = self.next_pts,
                units = self.units_produced,
                "Codec session closed"
            );
        }
        self.planar = None;
        self.packet = Vec::new();
        self.state = SessionState::Closed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Frames submitted so far (the next presentation timestamp)
    pub fn frames_submitted(&self) -> u64 {
        self.next_pts
    }

    pub fn units_produced(&self) -> u64 {
        self.units_produced
    }

    /// Planar buffer holding the most recently converted frame
    pub fn planar_frame(&self) -> Option<&PlanarFrame> {
        self.planar.as_ref()
    }
}

impl Drop for CodecSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Holds `delay` frames back before emitting, like a B-frame encoder
    struct DelayCompressor {
        delay: usize,
        queue: VecDeque<u64>,
        fail_on: Option<u64>,
        dropped: Rc<Cell<u32>>,
    }

    impl DelayCompressor {
        fn new(delay: usize) -> Self {
            Self {
                delay,
                queue: VecDeque::new(),
                fail_on: None,
                dropped: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Compressor for DelayCompressor {
        fn name(&self) -> &'static str {
            "delay"
        }

        fn submit(&mut self, _frame: &PlanarFrame, pts: u64) -> Result<(), CodecError> {
            if self.fail_on == Some(pts) {
                return Err(CodecError::Encode("injected fault".to_string()));
            }
            self.queue.push_back(pts);
            Ok(())
        }

        fn drain(&mut self, out: &mut Vec<u8>) -> Result<Drain, CodecError> {
            if self.queue.len() <= self.delay {
                return Ok(Drain::NotReady);
            }
            let pts = self.queue.pop_front().unwrap();
            out.extend_from_slice(&pts.to_be_bytes());
            Ok(Drain::Ready { pts, keyframe: pts == 0 })
        }
    }

    impl Drop for DelayCompressor {
        fn drop(&mut self) {
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    fn small_config() -> CodecConfig {
        CodecConfig {
            width: 16,
            height: 16,
            ..CodecConfig::default()
        }
    }

    fn grey(width: u32, height: u32) -> RawFrame {
        RawFrame::solid(width, height, PixelFormat::Bgr24, (128, 128, 128)).unwrap()
    }

    #[test]
    fn test_encode_before_init_fails() {
        let mut session = CodecSession::new(small_config());
        let err = session.encode_frame(&grey(16, 16)).unwrap_err();
        assert!(matches!(err, CodecError::Configuration(_)));
        assert_eq!(session.frames_submitted(), 0);
    }

    #[test]
    fn test_reinit_is_rejected() {
        let mut session = CodecSession::new(small_config());
        session.init("raw").unwrap();
        assert!(matches!(session.init("raw"), Err(CodecError::Configuration(_))));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_unsupported_codec_closes_session() {
        let mut session = CodecSession::new(small_config());
        assert!(matches!(session.init("mpeg1"), Err(CodecError::Configuration(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.init("raw").is_err());
    }

    #[test]
    fn test_odd_dimensions_fail_init() {
        let mut session = CodecSession::new(CodecConfig {
            width: 15,
            ..small_config()
        });
        assert!(matches!(session.init("raw"), Err(CodecError::Configuration(_))));
    }

    #[test]
    fn test_unallocatable_buffers_are_resource_errors() {
        // 2^31 x 2^31 planar frame is larger than any allocation can be
        let mut session = CodecSession::new(CodecConfig {
            width: 1 << 31,
            height: 1 << 31,
            ..CodecConfig::default()
        });

        assert!(matches!(session.init("raw"), Err(CodecError::Resource(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.planar_frame().is_none());
    }

    #[test]
    fn test_not_ready_then_output() {
        let mut session = CodecSession::new(small_config());
        session.init_with_compressor(Box::new(DelayCompressor::new(2))).unwrap();

        assert!(session.encode_frame(&grey(16, 16)).unwrap().is_none());
        assert!(session.encode_frame(&grey(16, 16)).unwrap().is_none());

        let unit = session.encode_frame(&grey(16, 16)).unwrap().unwrap();
        assert_eq!(unit.pts, 0);
        assert!(unit.keyframe);
        assert_eq!(session.frames_submitted(), 3);
        assert_eq!(session.units_produced(), 1);
    }

    #[test]
    fn test_pts_advances_without_output() {
        let mut session = CodecSession::new(small_config());
        session.init_with_compressor(Box::new(DelayCompressor::new(5))).unwrap();

        for _ in 0..4 {
            assert!(session.encode_frame(&grey(16, 16)).unwrap().is_none());
        }
        assert_eq!(session.frames_submitted(), 4);
    }

    #[test]
    fn test_fault_closes_and_releases_once() {
        let mut compressor = DelayCompressor::new(0);
        compressor.fail_on = Some(1);
        let dropped = Rc::clone(&compressor.dropped);

        let mut session = CodecSession::new(small_config());
        session.init_with_compressor(Box::new(compressor)).unwrap();

        assert!(session.encode_frame(&grey(16, 16)).unwrap().is_some());
        assert!(matches!(session.encode_frame(&grey(16, 16)), Err(CodecError::Encode(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(dropped.get(), 1);

        assert!(matches!(session.encode_frame(&grey(16, 16)), Err(CodecError::Configuration(_))));
        drop(session);
        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn test_drop_releases_compressor() {
        let compressor = DelayCompressor::new(0);
        let dropped = Rc::clone(&compressor.dropped);

        let mut session = CodecSession::new(small_config());
        session.init_with_compressor(Box::new(compressor)).unwrap();
        session.close();
        session.close();
        assert_eq!(dropped.get(), 1);

        drop(session);
        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn test_mismatched_frame_is_resized() {
        let mut session = CodecSession::new(small_config());
        session.init("raw").unwrap();

        let unit = session.encode_frame(&grey(40, 30)).unwrap().unwrap();
        assert_eq!(unit.len(), 16 * 16 * 3 / 2);

        let planar = session.planar_frame().unwrap();
        assert_eq!(planar.y_plane().len(), 16 * 16);
        assert_eq!(planar.u_plane().len(), 16 * 16 / 4);
        assert_eq!(planar.v_plane().len(), 16 * 16 / 4);
    }

    #[test]
    fn test_raw_session_is_deterministic() {
        let run = || {
            let mut session = CodecSession::new(small_config());
            session.init("raw").unwrap();
            (0..5)
                .map(|_| session.encode_frame(&grey(16, 16)).unwrap())
                .collect::<Vec<_>>()
        };

        let first = run();
        assert!(first.iter().all(|unit| unit.is_some()));
        assert_eq!(first, run());
    }
}
