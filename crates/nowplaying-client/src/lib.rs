pub mod core;
pub mod http;
pub mod status;
pub mod transport;
pub mod view;

pub use crate::core::{ClientSettings, EmbedReadySignal, LiveStatusClient};
pub use crate::status::{LiveStatus, Phase};
pub use crate::view::NowPlayingView;
