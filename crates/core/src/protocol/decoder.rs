//! Streaming frame decoder
//!
//! State machine over decoded lines: `Idle` until START, `Receiving` while
//! data lines accumulate, finalize on END. The payload encoding is resolved
//! at runtime by the first recognizable data line; lines seen before that
//! are buffered and replayed through the parser when the frame closes.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::matrix::MatrixState;
use crate::protocol::line::{self, Detection};
use crate::types::{FrameFormat, MatrixFrame};
use crate::MATRIX_DIM;

const START_MARKER: &str = "START";
const END_MARKER: &str = "END";

/// Per-frame accumulation between START and END
struct FrameInProgress {
    format: FrameFormat,
    /// Lines received before the format was resolved, replayed on END
    pending: Vec<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    byte_count: usize,
    rows_seen: [bool; MATRIX_DIM],
}

impl FrameInProgress {
    fn new() -> Self {
        Self {
            format: FrameFormat::Unknown,
            pending: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            byte_count: 0,
            rows_seen: [false; MATRIX_DIM],
        }
    }

    /// Consume one data line: resolve the format if still unknown, then
    /// apply the line to the matrix (or buffer it for the END replay).
    fn ingest(&mut self, line: &str, matrix: &mut MatrixState) {
        self.byte_count += line.len();

        if self.format == FrameFormat::Unknown {
            match line::detect_format(line) {
                Detection::TableHeader(columns) => {
                    trace!(?columns, "table format detected");
                    self.format = FrameFormat::Table(columns);
                    // The header carries no point data.
                    return;
                }
                Detection::Simple => {
                    trace!("simple format detected");
                    self.format = FrameFormat::Simple;
                }
                Detection::None => {
                    self.pending.push(line.to_string());
                    return;
                }
            }
        }

        self.apply(line, matrix);
    }

    /// Parse one line under the current format and write its updates.
    fn apply(&mut self, line: &str, matrix: &mut MatrixState) {
        let updates = match &self.format {
            FrameFormat::Simple => line::parse_simple(line).into_iter().collect(),
            FrameFormat::Table(columns) => line::parse_table_row(line, columns),
            FrameFormat::Unknown => Vec::new(),
        };
        for update in updates {
            if matrix.set(update.row, update.col, update.value) {
                self.rows_seen[update.row] = true;
            }
        }
    }
}

enum DecodeState {
    Idle,
    Receiving(FrameInProgress),
}

/// Decoder consuming the transport's line stream
///
/// The matrix persists across frames: a frame that skips cells emits their
/// last-known values rather than zeroes.
pub struct FrameDecoder {
    state: DecodeState,
    matrix: MatrixState,
    frame_id: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            matrix: MatrixState::new(),
            frame_id: 0,
        }
    }

    /// Current matrix contents.
    pub fn matrix(&self) -> &MatrixState {
        &self.matrix
    }

    /// Number of frames started so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Feed one decoded line. Returns the finalized frame on END.
    pub fn feed(&mut self, raw: &str) -> Option<MatrixFrame> {
        let line = raw.trim();
        if line.is_empty() {
            return None;
        }

        if line == START_MARKER {
            if matches!(self.state, DecodeState::Receiving(_)) {
                // A new START abandons the frame in progress silently.
                trace!(frame_id = self.frame_id, "START before END, frame abandoned");
            }
            self.frame_id += 1;
            self.state = DecodeState::Receiving(FrameInProgress::new());
            return None;
        }

        if line == END_MARKER {
            return self.finalize();
        }

        match &mut self.state {
            DecodeState::Idle => {
                // Legacy whole-row lines arrive outside any frame and
                // update the matrix directly.
                for update in line::parse_legacy_row(line) {
                    self.matrix.set(update.row, update.col, update.value);
                }
                None
            }
            DecodeState::Receiving(frame) => {
                frame.ingest(line, &mut self.matrix);
                None
            }
        }
    }

    fn finalize(&mut self) -> Option<MatrixFrame> {
        let DecodeState::Receiving(mut frame) =
            std::mem::replace(&mut self.state, DecodeState::Idle)
        else {
            // END without START; nothing to emit.
            return None;
        };

        // Replay lines that arrived before format detection completed.
        let pending = std::mem::take(&mut frame.pending);
        for line in &pending {
            frame.apply(line, &mut self.matrix);
        }

        let elapsed_ms = frame.started.elapsed().as_secs_f64() * 1000.0;
        let out = MatrixFrame {
            frame_id: self.frame_id,
            format: frame.format,
            started_at: frame.started_at,
            values: self.matrix.snapshot(),
            rows_seen: frame
                .rows_seen
                .iter()
                .enumerate()
                .filter_map(|(row, seen)| seen.then_some(row as u8))
                .collect(),
            byte_count: frame.byte_count,
            elapsed_ms,
        };
        debug!(
            frame_id = out.frame_id,
            bytes = out.byte_count,
            elapsed_ms,
            rate_kbps = out.throughput_kbps(),
            "frame complete"
        );
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, lines: &[&str]) -> Vec<MatrixFrame> {
        lines.iter().filter_map(|l| decoder.feed(l)).collect()
    }

    fn table_header() -> String {
        (0..MATRIX_DIM)
            .map(|c| format!("X{c}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_simple_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &["START", "X0Y0:500", "X1Y0:999", "END"]);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.format, FrameFormat::Simple);
        assert_eq!(frame.values[0][0], 500);
        assert_eq!(frame.values[0][1], 999);
        let others: i64 = frame
            .values
            .iter()
            .flatten()
            .sum::<i64>()
            - 500
            - 999;
        assert_eq!(others, 0);
        assert_eq!(frame.rows_seen, vec![0]);
    }

    #[test]
    fn test_table_frame() {
        let mut decoder = FrameDecoder::new();
        let mut lines = vec!["START".to_string(), table_header()];
        for row in 0..MATRIX_DIM {
            let values: Vec<String> = (0..MATRIX_DIM).map(|c| (row * 100 + c).to_string()).collect();
            lines.push(format!("Y{row},{}", values.join(",")));
        }
        lines.push("END".to_string());

        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let frames = feed_all(&mut decoder, &refs);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert!(matches!(frame.format, FrameFormat::Table(_)));
        assert!(frame.is_complete());
        assert_eq!(frame.values[4][7], 407);
    }

    #[test]
    fn test_short_header_yields_empty_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &["START", "X0,X1,X2", "Y0,10,20,30", "END"]);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        // 3-column header never resolves the format; no points recorded.
        assert_eq!(frame.format, FrameFormat::Unknown);
        assert!(frame.rows_seen.is_empty());
        assert!(frame.values.iter().flatten().all(|&v| v == 0));
    }

    #[test]
    fn test_data_before_header_replayed_on_end() {
        let mut decoder = FrameDecoder::new();
        let header = table_header();
        // Row line arrives before the header; it must still land via the
        // END replay once the format is known.
        let frames = feed_all(
            &mut decoder,
            &["START", "Y2,5,6,7", header.as_str(), "END"],
        );
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.values[2][0], 5);
        assert_eq!(frame.values[2][2], 7);
        assert_eq!(frame.rows_seen, vec![2]);
    }

    #[test]
    fn test_values_persist_across_frames() {
        let mut decoder = FrameDecoder::new();
        feed_all(&mut decoder, &["START", "X3Y3:777", "END"]);
        let frames = feed_all(&mut decoder, &["START", "X0Y0:1", "END"]);
        // Cell (3,3) was not in the second frame but keeps its value.
        assert_eq!(frames[0].values[3][3], 777);
        assert_eq!(frames[0].values[0][0], 1);
        assert_eq!(frames[0].rows_seen, vec![0]);
    }

    #[test]
    fn test_restart_abandons_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(
            &mut decoder,
            &["START", "X0Y0:111", "START", "X1Y1:222", "END"],
        );
        // Only the second frame emits; its id reflects both STARTs.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_id, 2);
        assert_eq!(frames[0].rows_seen, vec![1]);
        // The abandoned frame's update still reached the matrix before the
        // restart; only the frame object was discarded.
        assert_eq!(frames[0].values[0][0], 111);
    }

    #[test]
    fn test_end_without_start_ignored() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed("END").is_none());
        assert_eq!(decoder.frame_id(), 0);
    }

    #[test]
    fn test_legacy_rows_outside_frames() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed("Row02 1 2 3 4").is_none());
        assert_eq!(decoder.matrix().get(2, 3), 4);
    }

    #[test]
    fn test_legacy_rows_ignored_inside_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &["START", "Row02 9 9 9", "END"]);
        // Inside a frame the line is buffered as unknown-format data and
        // parses to nothing on replay.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].values[2][0], 0);
    }

    #[test]
    fn test_byte_count_accumulates() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &["START", "X0Y0:5", "X1Y0:6", "END"]);
        assert_eq!(frames[0].byte_count, "X0Y0:5".len() + "X1Y0:6".len());
    }

    #[test]
    fn test_out_of_range_cells_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(
            &mut decoder,
            &["START", "X0Y0:1", "X16Y0:2", "X0Y16:3", "END"],
        );
        let frame = &frames[0];
        assert_eq!(frame.values[0][0], 1);
        assert_eq!(frame.values.iter().flatten().sum::<i64>(), 1);
    }
}
