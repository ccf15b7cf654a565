//! Rendition ladder: which video qualities get produced, and in what order.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bitrate reserved for the paired audio track when advertising bandwidth.
pub const AUDIO_BITRATE_KBPS: u32 = 192;

/// Bitrate of the synthetic rendition added at the source's native height.
pub const SYNTHETIC_BITRATE_KBPS: u32 = 2000;

/// Priority cap used when a request does not ask for a quality.
pub const DEFAULT_PRIORITY_CAP: u32 = 1080;

/// One encoded video quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rendition {
    pub height: u32,
    pub bitrate_kbps: u32,
}

pub const CANONICAL_LADDER: [Rendition; 8] = [
    Rendition::new(144, 200),
    Rendition::new(240, 400),
    Rendition::new(360, 800),
    Rendition::new(480, 1200),
    Rendition::new(720, 2500),
    Rendition::new(1080, 5000),
    Rendition::new(1440, 8000),
    Rendition::new(2160, 15000),
];

impl Rendition {
    pub const fn new(height: u32, bitrate_kbps: u32) -> Self {
        Self {
            height,
            bitrate_kbps,
        }
    }

    /// Height handed to the encoder; H.264 wants it even.
    pub fn encoded_height(&self) -> u32 {
        (self.height + 1) / 2 * 2
    }

    /// Advertised BANDWIDTH in bits per second, audio included.
    pub fn bandwidth(&self) -> u64 {
        (u64::from(self.bitrate_kbps) + u64::from(AUDIO_BITRATE_KBPS)) * 1000
    }

    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }

    pub fn playlist_name(&self) -> String {
        format!("video_{}p.m3u8", self.height)
    }

    pub fn temp_playlist_name(&self) -> String {
        format!("video_temp_{}p.m3u8", self.height)
    }

    pub fn segment_pattern(&self) -> String {
        format!("video_{}p_%03d.ts", self.height)
    }
}

/// Builds the valid ladder for a source, ascending by height.
///
/// The top entry always sits at the source's own height: a synthetic
/// rendition is appended when the canonical table has no exact match.
pub fn build_ladder(source_height: u32) -> Result<Vec<Rendition>> {
    if source_height == 0 {
        return Err(Error::Validation("source height must be positive".into()));
    }

    let mut ladder: Vec<Rendition> = CANONICAL_LADDER
        .iter()
        .copied()
        .filter(|r| r.height <= source_height)
        .collect();

    if ladder.last().map(|r| r.height) != Some(source_height) {
        ladder.push(Rendition::new(source_height, SYNTHETIC_BITRATE_KBPS));
    }

    Ok(ladder)
}

/// Processing order: the rendition a viewer is most likely to watch first
/// goes to the front, the rest keep ascending order behind it.
///
/// The front is the highest canonical entry at or below `requested_max` (or
/// [`DEFAULT_PRIORITY_CAP`]). The synthetic native-height entry never leads.
/// When nothing fits under the cap the lowest rendition is used.
pub fn prioritize(ladder: &[Rendition], requested_max: Option<u32>) -> Vec<Rendition> {
    let cap = requested_max.unwrap_or(DEFAULT_PRIORITY_CAP);
    let front = ladder
        .iter()
        .enumerate()
        .filter(|(_, r)| r.height <= cap && CANONICAL_LADDER.contains(r))
        .max_by_key(|(_, r)| r.height)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut ordered = Vec::with_capacity(ladder.len());
    if let Some(first) = ladder.get(front) {
        ordered.push(*first);
    }
    ordered.extend(
        ladder
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != front)
            .map(|(_, r)| *r),
    );
    ordered
}
