//! Transcode command construction.
//!
//! Translates a [`VideoSource`] + RTMP destination into the exact ffmpeg
//! argv executed inside an isolated unit. Web page sources go through a
//! [`SourceResolver`] first to obtain a direct media URL.

mod builder;
mod resolver;
mod source;

pub use builder::{
    build_stream_args, container_input, validate_request, CommandError, AUDIO_BITRATE,
    AUDIO_CHANNELS, AUDIO_SAMPLE_RATE, GOP_SIZE, VIDEO_BUFSIZE, VIDEO_MAXRATE,
};
pub use resolver::{ResolveError, ResolverConfig, SourceResolver, YtDlpResolver};
pub use source::VideoSource;
