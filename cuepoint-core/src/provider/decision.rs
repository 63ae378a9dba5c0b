// Direct-play decision engine
//
// Minimal engine: direct play when the device declared any direct-play
// profile, otherwise the first transcoding profile, otherwise progressive.

use async_trait::async_trait;
use serde_json::json;

use super::{DecisionEngine, DecisionRequest, Delivery, ProviderError};
use crate::models::{MediaPartId, StreamPlan, StreamingProtocol};

#[derive(Debug, Clone)]
pub struct DirectPlayDecisionEngine {
    base_url: String,
}

impl DirectPlayDecisionEngine {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DecisionEngine for DirectPlayDecisionEngine {
    fn name(&self) -> &'static str {
        "direct_play"
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<Delivery, ProviderError> {
        if request.offset_ms < 0 {
            return Err(ProviderError::Rejected(format!(
                "negative offset {}",
                request.offset_ms
            )));
        }

        let part = request
            .item
            .media_part_id
            .clone()
            .unwrap_or_else(|| MediaPartId::from_string(request.item.id.as_str().to_string()));

        let (method, protocol, container) = match request.capability.as_deref() {
            Some(cap) if !cap.direct_play_profiles.is_empty() => (
                "directplay",
                StreamingProtocol::Progressive,
                cap.direct_play_profiles[0].container.clone(),
            ),
            Some(cap) => match cap.transcoding_profiles.first() {
                Some(tp) => (
                    "transcode",
                    tp.protocol.unwrap_or(StreamingProtocol::Hls),
                    tp.container.clone(),
                ),
                None => ("directplay", StreamingProtocol::Progressive, String::new()),
            },
            None => ("directplay", StreamingProtocol::Progressive, String::new()),
        };

        let plan = json!({
            "version": 1,
            "method": method,
            "itemId": request.item.id,
            "mediaPartId": part,
            "protocol": protocol.as_str(),
            "container": container,
            "offsetMs": request.offset_ms,
            "maxBitrateKbps": request
                .capability
                .as_deref()
                .and_then(|c| c.max_streaming_bitrate_kbps),
            "capabilityVersion": request.capability_version,
        });

        let playback_url = format!(
            "{}/parts/{}/{}?session={}&offsetMs={}",
            self.base_url,
            part.as_str(),
            method,
            request.session_id.as_str(),
            request.offset_ms
        );

        Ok(Delivery {
            stream_plan: StreamPlan::new(plan.to_string()),
            playback_url,
            media_part_id: Some(part),
            duration_ms: request.item.duration_ms,
        })
    }
}
