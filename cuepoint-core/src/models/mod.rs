pub mod capability;
pub mod id;
pub mod keyframe;
pub mod playlist;
pub mod session;

pub use capability::{
    CapabilityDeclaration, CapabilityProfile, CodecProfile, DeclaredVersion, DeviceCapabilities,
    DirectPlayProfile, StreamingProtocol, SubtitleDelivery, SubtitleProfile, TranscodingProfile,
};
pub use id::{generate_id, DeviceId, EntryId, GeneratorId, ItemId, MediaPartId, SessionId};
pub use keyframe::{KeyframeIndex, SeekResolution};
pub use playlist::{
    GeneratorSeed, NavigationResult, PeekedMove, PlaylistChunk, PlaylistCursor, PlaylistEntry,
    PlaylistGenerator, PlaylistItem, PlaylistType, UpstreamCursor,
};
pub use session::{
    DecideRequest, DecisionAction, DecisionStatus, HeartbeatAck, HeartbeatRequest,
    PlaybackDecision, PlaybackSession, PlaybackState, ResumeDetails, StartPlaybackRequest,
    StartedSession, StopOutcome, StreamPlan,
};
