//! Bounds-checked views over the buffers the consensus engine owns for the
//! duration of one upcall.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a>(&'a [u8]);

impl<'a> Request<'a> {
    pub fn new(contents: &'a [u8]) -> Self {
        Self(contents)
    }

    pub fn first_byte(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NonDet<'a>(Option<&'a [u8]>);

impl<'a> NonDet<'a> {
    pub fn new(contents: Option<&'a [u8]>) -> Self {
        Self(contents)
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyOverflow {
    pub len: usize,
    pub capacity: usize,
}

impl std::fmt::Display for ReplyOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reply length {} exceeds capacity {}",
            self.len, self.capacity
        )
    }
}

impl std::error::Error for ReplyOverflow {}

/// Pre-allocated reply buffer plus the declared reply length.
///
/// The declared length never exceeds the capacity, and only the declared
/// prefix is exposed through `as_bytes`.
#[derive(Debug)]
pub struct Reply<'a> {
    contents: &'a mut [u8],
    len: usize,
}

impl<'a> Reply<'a> {
    pub fn new(contents: &'a mut [u8]) -> Self {
        Self { contents, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.contents.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set_len(&mut self, len: usize) -> Result<(), ReplyOverflow> {
        self.check(len)?;
        self.len = len;
        Ok(())
    }

    /// Clear exactly `len` bytes from the start of the buffer.
    pub fn zero_fill(&mut self, len: usize) -> Result<(), ReplyOverflow> {
        self.check(len)?;
        self.contents[..len].fill(0);
        self.len = len;
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ReplyOverflow> {
        self.check(bytes.len())?;
        self.contents[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.contents[..self.len]
    }

    fn check(&self, len: usize) -> Result<(), ReplyOverflow> {
        if len > self.capacity() {
            return Err(ReplyOverflow {
                len,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_has_no_first_byte() {
        assert_eq!(Request::new(&[]).first_byte(), None);
        assert_eq!(Request::new(&[7, 1]).first_byte(), Some(7));
    }

    #[test]
    fn reply_bounds() {
        let mut contents = [0xffu8; 16];
        let mut reply = Reply::new(&mut contents);
        assert_eq!(reply.capacity(), 16);
        assert!(reply.is_empty());
        assert_eq!(
            reply.set_len(17),
            Err(ReplyOverflow {
                len: 17,
                capacity: 16
            })
        );
        assert!(reply.write(&[0; 17]).is_err());
        assert!(reply.is_empty());

        reply.write(&[1, 2, 3]).unwrap();
        assert_eq!(reply.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn zero_fill_clears_only_prefix() {
        let mut contents = [0xffu8; 16];
        let mut reply = Reply::new(&mut contents);
        reply.zero_fill(8).unwrap();
        assert_eq!(reply.len(), 8);
        assert!(reply.as_bytes().iter().all(|&b| b == 0));
        drop(reply);
        assert!(contents[8..].iter().all(|&b| b == 0xff));
    }
}
