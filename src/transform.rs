//! Raw analysis trimming for the visualizer.
//!
//! Raw Spotify analysis payloads can exceed 500KB; the visualizer only
//! needs a bounded subset. [`transform`] is pure and deterministic: no
//! I/O, and identical inputs always produce identical output.

use serde::{Deserialize, Serialize};

use crate::spotify::{RawAnalysis, RawFeatures, RawSegment, RawSection};
use crate::validate::TrackId;

/// Hard ceiling on segments kept per track, not a sample: everything
/// beyond this index is dropped.
pub const SEGMENT_CAP: usize = 2000;

/// Beats at or below this confidence are discarded as uncertain.
pub const MIN_BEAT_CONFIDENCE: f64 = 0.3;

const PITCH_DIMENSIONS: usize = 12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub duration: f64,
    pub loudness: f64,
    pub pitches: Vec<f64>,
    pub timbre: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub start: f64,
    pub duration: f64,
    pub tempo: f64,
    pub key: i32,
    pub mode: i32,
    pub loudness: f64,
}

/// Processed audio analysis - only what the visualizer uses. This is the
/// unit of caching and the unit returned to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub track_id: TrackId,
    pub duration: f64,
    pub tempo: f64,
    pub energy: f64,
    pub beats: Vec<Beat>,
    pub segments: Vec<Segment>,
    pub sections: Vec<Section>,
}

/// Transform a raw analysis (and optional features) payload into the
/// visualizer shape. Low-confidence beats are filtered, segments capped
/// at [`SEGMENT_CAP`], and every missing field falls back to a stated
/// default - this function never fails.
pub fn transform(
    track_id: &TrackId,
    analysis: RawAnalysis,
    features: Option<RawFeatures>,
) -> AnalysisResult {
    let beats = analysis
        .beats
        .into_iter()
        .filter(|b| b.confidence > MIN_BEAT_CONFIDENCE)
        .map(|b| Beat {
            start: b.start,
            duration: b.duration,
            confidence: b.confidence,
        })
        .collect();

    // Segments drive most visuals; upstream order is time order, keep it.
    let segments = analysis
        .segments
        .into_iter()
        .take(SEGMENT_CAP)
        .map(shape_segment)
        .collect();

    let sections = analysis.sections.into_iter().map(shape_section).collect();

    let track = analysis.track;
    let features = features.unwrap_or_default();

    AnalysisResult {
        track_id: track_id.clone(),
        duration: track.duration.unwrap_or(0.0),
        tempo: features.tempo.or(track.tempo).unwrap_or(120.0),
        energy: features.energy.unwrap_or(0.5),
        beats,
        segments,
        sections,
    }
}

fn shape_segment(s: RawSegment) -> Segment {
    Segment {
        start: s.start,
        duration: s.duration,
        loudness: s.loudness_start.or(s.loudness).unwrap_or(-60.0),
        pitches: twelve(s.pitches),
        timbre: twelve(s.timbre),
    }
}

fn shape_section(s: RawSection) -> Section {
    Section {
        start: s.start,
        duration: s.duration,
        tempo: s.tempo.unwrap_or(120.0),
        key: s.key.unwrap_or(-1),
        mode: s.mode.unwrap_or(0),
        loudness: s.loudness.unwrap_or(-10.0),
    }
}

/// Pitch/timbre vectors are exactly 12 floats; absent or short input is
/// zero-padded, overlong input truncated.
fn twelve(values: Option<Vec<f64>>) -> Vec<f64> {
    let mut values = values.unwrap_or_default();
    values.resize(PITCH_DIMENSIONS, 0.0);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{RawBeat, RawTrackSummary};
    use crate::validate;

    fn track_id() -> TrackId {
        validate::track_id("4uLU6hMCjMI75M1A2tKUQC").unwrap()
    }

    fn beat(confidence: f64) -> RawBeat {
        RawBeat {
            start: 0.0,
            duration: 0.5,
            confidence,
        }
    }

    fn analysis_with(beats: Vec<RawBeat>, segment_count: usize) -> RawAnalysis {
        RawAnalysis {
            track: RawTrackSummary {
                duration: Some(200.0),
                tempo: Some(98.0),
            },
            beats,
            segments: (0..segment_count)
                .map(|i| RawSegment {
                    start: i as f64,
                    duration: 1.0,
                    ..Default::default()
                })
                .collect(),
            sections: vec![],
        }
    }

    #[test]
    fn filters_low_confidence_beats_and_caps_segments() {
        let raw = analysis_with(vec![beat(0.1), beat(0.5), beat(0.9)], 2500);
        let result = transform(&track_id(), raw, None);

        assert_eq!(result.beats.len(), 2);
        assert!(result.beats.iter().all(|b| b.confidence > MIN_BEAT_CONFIDENCE));
        assert_eq!(result.segments.len(), SEGMENT_CAP);
        // First 2000 in original order, not a sample.
        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[1999].start, 1999.0);
    }

    #[test]
    fn beat_confidence_threshold_is_exclusive() {
        let raw = analysis_with(vec![beat(0.3)], 0);
        let result = transform(&track_id(), raw, None);
        assert!(result.beats.is_empty());
    }

    #[test]
    fn missing_confidence_counts_as_uncertain() {
        let raw = analysis_with(vec![RawBeat::default()], 0);
        let result = transform(&track_id(), raw, None);
        assert!(result.beats.is_empty());
    }

    #[test]
    fn segment_defaults() {
        let raw = RawAnalysis {
            segments: vec![
                RawSegment {
                    loudness_start: Some(-12.0),
                    loudness: Some(-20.0),
                    ..Default::default()
                },
                RawSegment {
                    loudness: Some(-20.0),
                    ..Default::default()
                },
                RawSegment {
                    pitches: Some(vec![0.7; 3]),
                    timbre: Some(vec![1.0; 15]),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let result = transform(&track_id(), raw, None);

        // loudness_start wins over loudness; -60 when neither is present.
        assert_eq!(result.segments[0].loudness, -12.0);
        assert_eq!(result.segments[1].loudness, -20.0);
        assert_eq!(result.segments[2].loudness, -60.0);
        // Short pitch vectors are zero-padded, long timbre truncated.
        assert_eq!(result.segments[2].pitches.len(), 12);
        assert_eq!(result.segments[2].pitches[2], 0.7);
        assert_eq!(result.segments[2].pitches[3], 0.0);
        assert_eq!(result.segments[2].timbre, vec![1.0; 12]);
        assert_eq!(result.segments[0].pitches, vec![0.0; 12]);
    }

    #[test]
    fn section_defaults_and_no_truncation() {
        let raw = RawAnalysis {
            sections: (0..3000).map(|_| RawSection::default()).collect(),
            ..Default::default()
        };
        let result = transform(&track_id(), raw, None);

        assert_eq!(result.sections.len(), 3000);
        let section = &result.sections[0];
        assert_eq!(section.tempo, 120.0);
        assert_eq!(section.key, -1);
        assert_eq!(section.mode, 0);
        assert_eq!(section.loudness, -10.0);
    }

    #[test]
    fn top_level_defaults_without_features() {
        // No track summary, no features: duration 0, tempo 120, energy 0.5.
        let result = transform(&track_id(), RawAnalysis::default(), None);
        assert_eq!(result.duration, 0.0);
        assert_eq!(result.tempo, 120.0);
        assert_eq!(result.energy, 0.5);
    }

    #[test]
    fn tempo_prefers_features_then_analysis() {
        let raw = analysis_with(vec![], 0);

        let with_features = transform(
            &track_id(),
            raw.clone(),
            Some(RawFeatures {
                tempo: Some(128.0),
                energy: Some(0.8),
                ..Default::default()
            }),
        );
        assert_eq!(with_features.tempo, 128.0);
        assert_eq!(with_features.energy, 0.8);

        // Features present but sparse: fall back to the analysis tempo.
        let sparse = transform(&track_id(), raw.clone(), Some(RawFeatures::default()));
        assert_eq!(sparse.tempo, 98.0);
        assert_eq!(sparse.energy, 0.5);

        let none = transform(&track_id(), raw, None);
        assert_eq!(none.tempo, 98.0);
        assert_eq!(none.duration, 200.0);
    }

    #[test]
    fn transform_is_deterministic() {
        let make = || analysis_with(vec![beat(0.4), beat(0.2)], 50);
        let features = RawFeatures {
            tempo: Some(140.0),
            energy: Some(0.9),
            danceability: Some(0.3),
            valence: Some(0.6),
        };
        let a = transform(&track_id(), make(), Some(features.clone()));
        let b = transform(&track_id(), make(), Some(features));
        assert_eq!(a, b);
    }
}
