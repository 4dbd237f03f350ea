pub mod outstream;

pub use outstream::{
    ChannelPlayerQueue, OutstreamSupport, PlayerInstruction, PlayerQueue, RendererHandle,
};
