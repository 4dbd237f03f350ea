pub mod bid;
pub mod bid_request;
pub mod media;
pub mod server_request;

pub use bid::{BidMeta, CanonicalBid, Currency, VideoMeta, DEFAULT_CURRENCY, DEFAULT_TTL};
pub use bid_request::{
    AuctionContext, BannerParams, BidRequest, ConsentSignals, Floor, MediaTypes, Params, Point,
    SlotGeometry, VideoParams,
};
pub use media::{parse_sizes_input, MediaType, Size, VideoContext};
pub use server_request::{HttpMethod, ServerRequest};
