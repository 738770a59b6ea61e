//! Chunked transcription: split long media into overlapping windows and merge
//! the per-window segments back into one sequence.

use super::error::PipelineError;
use crate::transcript::{Segment, TimeRange};

/// A trailing window shorter than this fraction of the nominal width is
/// folded into the previous window instead of becoming its own chunk.
const MIN_TAIL_FRACTION: f64 = 0.1;

/// One window of a chunk plan, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRange {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl ChunkRange {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Splits `[0, duration)` into windows of `width` seconds that overlap their
/// neighbours by `overlap` seconds.
///
/// Media no longer than `threshold` gets a single window. Windows start at
/// multiples of `width - overlap`; the last one ends exactly at `duration`.
pub fn plan_chunks(
    duration: f64,
    width: f64,
    overlap: f64,
    threshold: f64,
) -> Result<Vec<ChunkRange>, PipelineError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "media duration must be a non-negative number of seconds, got {}",
            duration
        )));
    }
    if !width.is_finite() || width <= 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "chunk width must be positive, got {}",
            width
        )));
    }
    if !overlap.is_finite() || overlap < 0.0 || overlap >= width {
        return Err(PipelineError::InvalidInput(format!(
            "chunk overlap must be in [0, {}), got {}",
            width, overlap
        )));
    }

    if duration <= threshold {
        return Ok(vec![ChunkRange {
            index: 0,
            start: 0.0,
            end: duration,
        }]);
    }

    let step = width - overlap;
    let min_tail = width * MIN_TAIL_FRACTION;
    let mut chunks = Vec::new();

    loop {
        let index = chunks.len();
        let start = index as f64 * step;
        let end = start + width;

        if end >= duration || duration - end < min_tail {
            chunks.push(ChunkRange {
                index,
                start,
                end: duration,
            });
            break;
        }

        chunks.push(ChunkRange { index, start, end });
    }

    Ok(chunks)
}

/// Chunk planner configured once per pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlanner {
    pub width: f64,
    pub overlap: f64,
    pub threshold: f64,
}

impl ChunkPlanner {
    pub fn new(width: f64, overlap: f64, threshold: f64) -> Self {
        Self {
            width,
            overlap,
            threshold,
        }
    }

    pub fn plan(&self, duration: f64) -> Result<Vec<ChunkRange>, PipelineError> {
        plan_chunks(duration, self.width, self.overlap, self.threshold)
    }
}

/// Segments transcribed from one chunk.
#[derive(Debug, Clone)]
pub struct ChunkSegments {
    pub range: ChunkRange,
    pub segments: Vec<Segment>,
}

/// Merges per-chunk segments (in chunk order) into one time-ordered sequence.
///
/// Each seam is cut at the midpoint of the overlap, `range_end - overlap / 2`
/// of the earlier chunk: segments starting before it come from the earlier
/// chunk, segments starting at or after it from the later one.
pub fn merge_chunk_segments(chunks: Vec<ChunkSegments>, overlap: f64) -> Vec<Segment> {
    let seams: Vec<f64> = chunks
        .iter()
        .map(|chunk| chunk.range.end - overlap / 2.0)
        .collect();
    let last = chunks.len().saturating_sub(1);

    let mut merged = Vec::with_capacity(chunks.iter().map(|c| c.segments.len()).sum());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let lower = if i > 0 { Some(seams[i - 1]) } else { None };
        let upper = if i < last { Some(seams[i]) } else { None };

        merged.extend(chunk.segments.into_iter().filter(|segment| {
            lower.map_or(true, |seam| segment.start >= seam)
                && upper.map_or(true, |seam| segment.start < seam)
        }));
    }

    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    merged
}
