use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Pulls complete JPEG images out of a `multipart/x-mixed-replace` body.
///
/// Part headers and boundaries are skipped by scanning for the JPEG start
/// and end markers, so the boundary string sent by the sensor does not need
/// to be known.
#[derive(Debug)]
pub struct MjpegFrameExtractor {
    buffer: BytesMut,
    max_frame_bytes: usize,
    scan_from: usize,
    in_frame: bool,
    oversized_frames: u64,
}

impl MjpegFrameExtractor {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_bytes,
            scan_from: 0,
            in_frame: false,
            oversized_frames: 0,
        }
    }

    /// Feed a chunk of the body and return every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if !self.in_frame {
                match find_marker(&self.buffer, SOI, 0) {
                    Some(start) => {
                        let _ = self.buffer.split_to(start);
                        self.in_frame = true;
                        self.scan_from = SOI.len();
                    }
                    None => {
                        // Keep a trailing 0xFF, it may be the first half of a marker
                        let keep = usize::from(self.buffer.last() == Some(&0xFF));
                        let discard = self.buffer.len() - keep;
                        let _ = self.buffer.split_to(discard);
                        break;
                    }
                }
            }

            match find_marker(&self.buffer, EOI, self.scan_from) {
                Some(end) => {
                    let frame = self.buffer.split_to(end + EOI.len()).freeze();
                    trace!("Extracted MJPEG frame of {} bytes", frame.len());
                    frames.push(frame);
                    self.in_frame = false;
                    self.scan_from = 0;
                }
                None => {
                    if self.buffer.len() > self.max_frame_bytes {
                        warn!(
                            "Discarding MJPEG frame larger than {} bytes",
                            self.max_frame_bytes
                        );
                        self.oversized_frames += 1;
                        self.buffer.clear();
                        self.in_frame = false;
                        self.scan_from = 0;
                    } else {
                        // Resume one byte early in case the marker is split across chunks
                        self.scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
                    }
                    break;
                }
            }
        }

        frames
    }

    /// Frames dropped because they exceeded the size limit
    pub fn oversized_frames(&self) -> u64 {
        self.oversized_frames
    }

    /// Bytes held while waiting for the rest of a frame
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + marker.len() {
        return None;
    }
    haystack[from..]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|position| position + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut data = SOI.to_vec();
        data.extend_from_slice(payload);
        data.extend_from_slice(&EOI);
        data
    }

    fn part(frame: &[u8]) -> Vec<u8> {
        let mut data = format!(
            "--123456789000000000000987654321\r\n\
             Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        )
        .into_bytes();
        data.extend_from_slice(frame);
        data.extend_from_slice(b"\r\n");
        data
    }

    #[test]
    fn test_extracts_frames_from_multipart_body() {
        let first = jpeg(&[1, 2, 3]);
        let second = jpeg(&[4, 5, 6, 7]);
        let mut body = part(&first);
        body.extend(part(&second));

        let mut extractor = MjpegFrameExtractor::new(1024);
        let frames = extractor.push(&body);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), first.as_slice());
        assert_eq!(frames[1].as_ref(), second.as_slice());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let frame = jpeg(&[9; 32]);
        let body = part(&frame);
        let mut extractor = MjpegFrameExtractor::new(1024);

        let mut frames = Vec::new();
        for chunk in body.chunks(1) {
            frames.extend(extractor.push(chunk));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), frame.as_slice());
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut extractor = MjpegFrameExtractor::new(16);
        let mut data = SOI.to_vec();
        data.extend_from_slice(&[0u8; 32]);

        assert!(extractor.push(&data).is_empty());
        assert_eq!(extractor.oversized_frames(), 1);
        assert_eq!(extractor.buffered_bytes(), 0);

        // The extractor recovers on the next frame
        let frames = extractor.push(&jpeg(&[1]));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_noise_without_frames_is_not_buffered() {
        let mut extractor = MjpegFrameExtractor::new(1024);
        assert!(extractor.push(b"--boundary\r\nheaders\r\n\r\n").is_empty());
        assert_eq!(extractor.buffered_bytes(), 0);
    }
}
