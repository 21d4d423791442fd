use std::io::{self, Read};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// Separa un flujo MJPEG (`image2pipe`) en JPEGs completos, de SOI a EOI.
pub struct JpegSplitter<R> {
    reader: R,
    buf: Vec<u8>,
    chunk: Vec<u8>,
    scan_from: usize,
    eof: bool,
}

impl<R: Read> JpegSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new(), chunk: vec![0; 64 * 1024], scan_from: 0, eof: false }
    }

    /// `Ok(None)` al agotarse el flujo; un JPEG truncado al final se descarta.
    pub fn next_jpeg(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(jpeg) = self.extract() {
                return Ok(Some(jpeg));
            }
            if self.eof {
                return Ok(None);
            }
            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "MJPEG frame too large"));
            }
            let n = self.reader.read(&mut self.chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&self.chunk[..n]);
            }
        }
    }

    fn extract(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find(&self.buf, &SOI, 0) else {
            // Un 0xFF final puede ser la mitad de un SOI.
            let keep = self.buf.len().min(1);
            self.buf.drain(..self.buf.len() - keep);
            self.scan_from = 0;
            return None;
        };
        if start > 0 {
            self.buf.drain(..start);
            self.scan_from = 0;
        }

        match find(&self.buf, &EOI, self.scan_from.max(SOI.len())) {
            Some(end) => {
                self.scan_from = 0;
                Some(self.buf.drain(..end + EOI.len()).collect())
            }
            None => {
                self.scan_from = self.buf.len().saturating_sub(1);
                None
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..].windows(2).position(|w| w == needle).map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lector que entrega los datos en trozos de tamaño fijo.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(out.len()).min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        [&SOI[..], payload, &EOI[..]].concat()
    }

    #[test]
    fn splits_concatenated_frames_across_reads() {
        let a = jpeg(&[1, 2, 3]);
        let b = jpeg(&[0xFF, 0x00, 4]);
        let data = [vec![9, 9], a.clone(), b.clone()].concat();

        for step in [1, 3, 64] {
            let mut sp = JpegSplitter::new(Trickle { data: data.clone(), pos: 0, step });
            assert_eq!(sp.next_jpeg().unwrap(), Some(a.clone()), "step {step}");
            assert_eq!(sp.next_jpeg().unwrap(), Some(b.clone()), "step {step}");
            assert_eq!(sp.next_jpeg().unwrap(), None);
        }
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let data = [jpeg(&[1]), vec![0xFF, 0xD8, 7, 7]].concat();
        let mut sp = JpegSplitter::new(io::Cursor::new(data));
        assert!(sp.next_jpeg().unwrap().is_some());
        assert_eq!(sp.next_jpeg().unwrap(), None);
    }

    #[test]
    fn empty_stream_has_no_frames() {
        let mut sp = JpegSplitter::new(io::empty());
        assert_eq!(sp.next_jpeg().unwrap(), None);
    }
}
