use crate::io::IoCursor;
use crate::status::{Error, Status};

const MAX_CODES: usize = 4096;
const MAX_WIDTH: u8 = 12;
const NO_CODE: u16 = 0xffff;

/// Resumable decompressor for GIF's LZW variant, including the
/// length-prefixed sub-block framing around the code stream.
///
/// All state lives in plain fields so a suspension is just an early return:
/// the bit accumulator, the code table and any partially emitted string
/// survive until the next `decode` call.
pub(crate) struct Lzw {
    literal_width: u8,
    width: u8,
    bits: u32,
    nbits: u8,
    /// Bytes left in the sub-block being read; 0 means the next byte is a
    /// block length.
    block_rem: u8,
    prev: u16,
    next_code: u16,
    end_seen: bool,
    done: bool,
    prefixes: [u16; MAX_CODES],
    suffixes: [u8; MAX_CODES],
    /// Pending output, last byte first; drained before anything else.
    stack: [u8; MAX_CODES],
    stack_len: usize,
}

impl Default for Lzw {
    fn default() -> Self {
        Lzw {
            literal_width: 0,
            width: 0,
            bits: 0,
            nbits: 0,
            block_rem: 0,
            prev: NO_CODE,
            next_code: 0,
            end_seen: false,
            done: false,
            prefixes: [0; MAX_CODES],
            suffixes: [0; MAX_CODES],
            stack: [0; MAX_CODES],
            stack_len: 0,
        }
    }
}

impl Lzw {
    fn clear_code(&self) -> u16 {
        1 << self.literal_width
    }

    /// Reset for a new frame whose declared minimum code size is
    /// `literal_width`.
    pub(crate) fn restart(&mut self, literal_width: u8) {
        self.literal_width = literal_width;
        self.width = literal_width + 1;
        self.bits = 0;
        self.nbits = 0;
        self.block_rem = 0;
        self.prev = NO_CODE;
        self.next_code = self.clear_code() + 2;
        self.end_seen = false;
        self.done = false;
        self.stack_len = 0;
    }

    /// Decompress into `dst[*wi..]`, bumping `*wi` per byte written.
    ///
    /// `Ok(())` means the frame's data, terminator included, is fully
    /// consumed. `ShortRead` and `ShortWrite` suspend with all progress
    /// kept.
    pub(crate) fn decode(
        &mut self,
        cur: &mut IoCursor,
        dst: &mut [u8],
        wi: &mut usize,
    ) -> Result<(), Status> {
        loop {
            while self.stack_len > 0 {
                if *wi >= dst.len() {
                    return Err(Status::ShortWrite);
                }
                self.stack_len -= 1;
                dst[*wi] = self.stack[self.stack_len];
                *wi += 1;
            }
            if self.done {
                return Ok(());
            }
            if self.end_seen {
                return self.skip_tail(cur);
            }

            while self.nbits < self.width {
                if self.block_rem == 0 {
                    match cur.read_u8() {
                        None => return Err(Status::ShortRead),
                        // A terminator with no end code still ends the frame.
                        Some(0) => {
                            self.done = true;
                            return Ok(());
                        }
                        Some(len) => {
                            self.block_rem = len;
                            continue;
                        }
                    }
                }
                match cur.read_u8() {
                    None => return Err(Status::ShortRead),
                    Some(b) => {
                        self.block_rem -= 1;
                        self.bits |= u32::from(b) << self.nbits;
                        self.nbits += 8;
                    }
                }
            }

            let code = (self.bits & ((1u32 << self.width) - 1)) as u16;
            self.bits >>= self.width;
            self.nbits -= self.width;
            self.step(code)?;
        }
    }

    /// Consume the remaining sub-block framing without decoding, through the
    /// zero-length terminator.
    pub(crate) fn finish(&mut self, cur: &mut IoCursor) -> Result<(), Status> {
        if self.done {
            return Ok(());
        }
        self.end_seen = true;
        self.skip_tail(cur)
    }

    fn skip_tail(&mut self, cur: &mut IoCursor) -> Result<(), Status> {
        loop {
            if self.block_rem > 0 {
                let n = usize::from(self.block_rem).min(cur.available());
                cur.ri += n;
                self.block_rem -= n as u8;
                if self.block_rem > 0 {
                    return Err(Status::ShortRead);
                }
            }
            match cur.read_u8() {
                None => return Err(Status::ShortRead),
                Some(0) => {
                    self.done = true;
                    return Ok(());
                }
                Some(len) => self.block_rem = len,
            }
        }
    }

    fn step(&mut self, code: u16) -> Result<(), Status> {
        let clear = self.clear_code();
        if code == clear {
            self.width = self.literal_width + 1;
            self.next_code = clear + 2;
            self.prev = NO_CODE;
            return Ok(());
        }
        if code == clear + 1 {
            self.end_seen = true;
            return Ok(());
        }
        if self.prev == NO_CODE {
            // The first code after a clear can only be a literal.
            if code >= clear {
                return Err(Error::BadCode.into());
            }
            self.stack[0] = code as u8;
            self.stack_len = 1;
            self.prev = code;
            return Ok(());
        }

        if code < self.next_code {
            self.push_string(code);
            let first = self.stack[self.stack_len - 1];
            if usize::from(self.next_code) < MAX_CODES {
                self.prefixes[usize::from(self.next_code)] = self.prev;
                self.suffixes[usize::from(self.next_code)] = first;
                self.next_code += 1;
            }
        } else if code == self.next_code && usize::from(self.next_code) < MAX_CODES {
            // The not-yet-defined code: string(prev) followed by its own
            // first byte. Reserve the bottom slot for that trailing byte,
            // which is only known once the chain walk is done.
            self.stack[0] = 0;
            self.stack_len = 1;
            self.push_string(self.prev);
            let first = self.stack[self.stack_len - 1];
            self.stack[0] = first;
            self.prefixes[usize::from(self.next_code)] = self.prev;
            self.suffixes[usize::from(self.next_code)] = first;
            self.next_code += 1;
        } else {
            return Err(Error::BadCode.into());
        }

        if usize::from(self.next_code) == (1usize << self.width) && self.width < MAX_WIDTH {
            self.width += 1;
        }
        self.prev = code;
        Ok(())
    }

    /// Append `code`'s byte string to the stack, last byte at the lowest
    /// free index, so draining top-down emits it in order.
    fn push_string(&mut self, mut code: u16) {
        loop {
            if code < self.clear_code() {
                self.stack[self.stack_len] = code as u8;
                self.stack_len += 1;
                return;
            }
            self.stack[self.stack_len] = self.suffixes[usize::from(code)];
            self.stack_len += 1;
            code = self.prefixes[usize::from(code)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Lzw;
    use crate::io::IoCursor;
    use crate::status::{Error, Status};

    /// LSB-first code packer mirroring the wire format.
    fn pack(codes: &[(u16, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut bits = 0u32;
        let mut n = 0u8;
        for &(code, width) in codes {
            bits |= u32::from(code) << n;
            n += width;
            while n >= 8 {
                out.push(bits as u8);
                bits >>= 8;
                n -= 8;
            }
        }
        if n > 0 {
            out.push(bits as u8);
        }
        out
    }

    fn in_blocks(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
        out
    }

    fn decode_all(stream: &[u8]) -> Result<Vec<u8>, Status> {
        let mut storage = stream.to_vec();
        let len = storage.len();
        let mut cur = IoCursor::new(&mut storage);
        cur.wi = len;
        cur.closed = true;

        let mut lzw = Lzw::default();
        lzw.restart(2);
        let mut out = Vec::new();
        let mut dst = [0u8; 8];
        loop {
            let mut wi = 0;
            let r = lzw.decode(&mut cur, &mut dst, &mut wi);
            out.extend_from_slice(&dst[..wi]);
            match r {
                Ok(()) => return Ok(out),
                Err(Status::ShortWrite) => continue,
                Err(s) => return Err(s),
            }
        }
    }

    #[test]
    fn literal_codes_round_trip() {
        // clear, 1, 2, 3 (table reaches 8 entries, width grows), end.
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (2, 3), (3, 3), (5, 4)]));
        assert_eq!(decode_all(&stream).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn not_yet_defined_code_emits_prev_plus_first() {
        // clear, 1, then code 6 which is exactly the next free entry.
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (6, 3), (5, 3)]));
        assert_eq!(decode_all(&stream).unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn derived_code_emits_its_string() {
        // clear, 1, 2 (defines 6 = [1, 2]), 6, end.
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (2, 3), (6, 3), (5, 4)]));
        assert_eq!(decode_all(&stream).unwrap(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn code_past_the_table_is_rejected() {
        let stream = in_blocks(&pack(&[(4, 3), (7, 3)]));
        assert_eq!(decode_all(&stream), Err(Status::Error(Error::BadCode)));
    }

    #[test]
    fn first_code_after_clear_must_be_a_literal() {
        let stream = in_blocks(&pack(&[(4, 3), (6, 3)]));
        assert_eq!(decode_all(&stream), Err(Status::Error(Error::BadCode)));
    }

    #[test]
    fn suspends_mid_code_and_resumes() {
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (2, 3), (3, 3), (5, 4)]));
        let len = stream.len();
        let mut storage = stream.clone();
        let mut cur = IoCursor::new(&mut storage);

        let mut lzw = Lzw::default();
        lzw.restart(2);
        let mut out = Vec::new();
        let mut dst = [0u8; 8];
        loop {
            cur.wi = (cur.ri + 1).min(len);
            cur.closed = cur.wi == len;
            let old_ri = cur.ri;
            let mut wi = 0;
            let r = lzw.decode(&mut cur, &mut dst, &mut wi);
            out.extend_from_slice(&dst[..wi]);
            match r {
                Ok(()) => break,
                Err(Status::ShortRead) => assert!(cur.ri > old_ri, "no progress"),
                Err(s) => panic!("unexpected status {s}"),
            }
        }
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(cur.ri, len);
    }

    #[test]
    fn short_write_drains_one_byte_at_a_time() {
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (2, 3), (6, 3), (5, 4)]));
        let len = stream.len();
        let mut storage = stream.clone();
        let mut cur = IoCursor::new(&mut storage);
        cur.wi = len;
        cur.closed = true;

        let mut lzw = Lzw::default();
        lzw.restart(2);
        let mut out = Vec::new();
        let mut dst = [0u8; 1];
        loop {
            let mut wi = 0;
            let r = lzw.decode(&mut cur, &mut dst, &mut wi);
            out.extend_from_slice(&dst[..wi]);
            match r {
                Ok(()) => break,
                Err(Status::ShortWrite) => continue,
                Err(s) => panic!("unexpected status {s}"),
            }
        }
        assert_eq!(out, vec![1, 2, 1, 2]);
    }

    #[test]
    fn terminator_without_end_code_ends_the_frame() {
        // 16 bits of codes exactly, so the terminator is the next read.
        let stream = in_blocks(&pack(&[(4, 3), (1, 3), (2, 3), (3, 3), (0, 4)]));
        assert_eq!(decode_all(&stream).unwrap(), vec![1, 2, 3, 0]);
    }
}
