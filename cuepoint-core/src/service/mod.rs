pub mod capability;
pub mod keyframe;
pub mod playback;
pub mod playlist;

pub use capability::{CapabilityRegistry, CapabilityStore};
pub use keyframe::KeyframeResolver;
pub use playback::{PlaybackService, SessionStore};
pub use playlist::{CreatePlaylistRequest, PlaylistService, PlaylistStore};
