use crate::security::upstream::{StreamInfo, UpstreamApi};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Online/offline camera summary for the status surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct CameraStatus {
    pub online_count: usize,
    pub offline_count: usize,
    pub total_count: usize,
    pub online_list: Vec<String>,
    pub offline_list: Vec<String>,
}

/// Upstream reachability summary
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub is_online: bool,
    pub response_time_ms: i64,
    pub last_error: Option<String>,
    pub last_check_time: DateTime<Utc>,
}

/// Read-only health queries against the upstream NVR
pub struct MonitoringService {
    upstream: Arc<dyn UpstreamApi>,
}

impl MonitoringService {
    /// Create a new monitoring service
    pub fn new(upstream: Arc<dyn UpstreamApi>) -> Self {
        Self { upstream }
    }

    /// Camera online/offline counts derived from the upstream stream list
    pub async fn camera_status(&self, token: &str) -> Result<CameraStatus> {
        let streams = self.upstream.list_streams(token).await?;
        Ok(classify_streams(&streams))
    }

    /// Probe the upstream API and measure its response time
    pub async fn upstream_status(&self, token: &str) -> UpstreamStatus {
        let start = Instant::now();
        let result = self.upstream.verify(token).await;
        let response_time_ms = start.elapsed().as_millis() as i64;

        match result {
            Ok(valid) => UpstreamStatus {
                is_online: valid,
                response_time_ms,
                last_error: (!valid).then(|| "token invalid".to_string()),
                last_check_time: Utc::now(),
            },
            Err(e) => UpstreamStatus {
                is_online: false,
                response_time_ms,
                last_error: Some(e.to_string()),
                last_check_time: Utc::now(),
            },
        }
    }
}

/// A camera is online iff its stream has a producer. `_WebRTC` restream
/// variants are folded into their camera; when both are present the base
/// stream decides, so the result never depends on map iteration order.
fn classify_streams(streams: &HashMap<String, StreamInfo>) -> CameraStatus {
    let mut cameras: HashMap<String, bool> = HashMap::new();

    for (stream_name, stream) in streams {
        let is_variant = stream_name.ends_with("_WebRTC");
        let camera_name = stream_name
            .strip_suffix("_WebRTC")
            .unwrap_or(stream_name)
            .to_string();
        let online = !stream.producers.is_empty();

        match cameras.entry(camera_name) {
            Entry::Vacant(entry) => {
                entry.insert(online);
            }
            Entry::Occupied(mut entry) => {
                if !is_variant {
                    entry.insert(online);
                }
            }
        }
    }

    let mut status = CameraStatus::default();
    for (camera_name, online) in cameras {
        if online {
            status.online_count += 1;
            status.online_list.push(camera_name);
        } else {
            status.offline_count += 1;
            status.offline_list.push(camera_name);
        }
    }

    status.total_count = status.online_count + status.offline_count;
    status.online_list.sort();
    status.offline_list.sort();
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(producer_count: usize) -> StreamInfo {
        StreamInfo {
            producers: (0..producer_count).map(|_| serde_json::json!({})).collect(),
        }
    }

    #[test]
    fn counts_online_and_offline_cameras() {
        let mut streams = HashMap::new();
        streams.insert("front".to_string(), stream(1));
        streams.insert("garage".to_string(), stream(2));
        streams.insert("backyard".to_string(), stream(0));

        let status = classify_streams(&streams);
        assert_eq!(status.online_count, 2);
        assert_eq!(status.offline_count, 1);
        assert_eq!(status.total_count, 3);
        assert_eq!(status.offline_list, vec!["backyard"]);
    }

    #[test]
    fn webrtc_variants_are_deduplicated() {
        let mut streams = HashMap::new();
        streams.insert("front".to_string(), stream(1));
        streams.insert("front_WebRTC".to_string(), stream(0));

        let status = classify_streams(&streams);
        assert_eq!(status.total_count, 1);
        assert_eq!(status.online_list, vec!["front"]);
    }

    #[test]
    fn base_stream_decides_when_it_disagrees_with_its_variant() {
        // Base offline, variant online: the camera counts as offline
        let mut streams = HashMap::new();
        streams.insert("garage".to_string(), stream(0));
        streams.insert("garage_WebRTC".to_string(), stream(1));

        let status = classify_streams(&streams);
        assert_eq!(status.total_count, 1);
        assert_eq!(status.offline_list, vec!["garage"]);

        // A variant alone still represents its camera
        let mut streams = HashMap::new();
        streams.insert("side_WebRTC".to_string(), stream(1));

        let status = classify_streams(&streams);
        assert_eq!(status.online_list, vec!["side"]);
    }
}
