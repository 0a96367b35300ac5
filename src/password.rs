//!
//! Password buffers with an explicit clear-on-exit contract
//!
use std::fmt;

use zeroize::Zeroize;

use crate::error::EncryptedMaterialError;

/// What happens to a password buffer once the operation that received it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferHandling {
    /// The buffer is zeroed on every exit path, including errors and panics
    #[default]
    ClearAfterUse,
    /// The buffer is left untouched and remains the caller's responsibility
    Preserve,
}

/// A borrowed password buffer.
///
/// Every operation in this crate that accepts a password takes a `Password` by value.
/// When it is dropped at the end of the operation the underlying buffer is zeroed,
/// unless it was created with [BufferHandling::Preserve]. Callers must not reuse a
/// buffer passed in the default mode.
pub struct Password<'a> {
    buf: &'a mut [u8],
    handling: BufferHandling,
}

impl<'a> Password<'a> {
    /// Wrap a buffer that is cleared after use
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self::with_handling(buf, BufferHandling::ClearAfterUse)
    }

    /// Wrap a buffer that is left intact after use
    pub fn preserving(buf: &'a mut [u8]) -> Self {
        Self::with_handling(buf, BufferHandling::Preserve)
    }

    pub fn with_handling(buf: &'a mut [u8], handling: BufferHandling) -> Self {
        Self { buf, handling }
    }

    pub fn handling(&self) -> BufferHandling {
        self.handling
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf
    }

    /// Password as UTF-8, which is what the PKCS#12 and PBES2 key derivations consume
    pub fn as_str(&self) -> Result<&str, EncryptedMaterialError> {
        std::str::from_utf8(self.buf).map_err(|_| EncryptedMaterialError::InvalidPasswordEncoding)
    }
}

impl Drop for Password<'_> {
    fn drop(&mut self) {
        if self.handling == BufferHandling::ClearAfterUse {
            self.buf.zeroize();
        }
    }
}

impl fmt::Debug for Password<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("buf", &"<PASSWORD>")
            .field("handling", &self.handling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_after_use() {
        let mut buf = b"changeit".to_vec();
        {
            let password = Password::new(&mut buf);
            assert_eq!(password.as_str().unwrap(), "changeit");
        }
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_preserve() {
        let mut buf = b"changeit".to_vec();
        drop(Password::preserving(&mut buf));
        assert_eq!(buf, b"changeit");
    }

    #[test]
    fn test_cleared_on_error_path() {
        let mut buf = vec![0xff, 0xfe, 0x41];
        let result = {
            let password = Password::new(&mut buf);
            password.as_str().map(str::len)
        };
        assert!(matches!(result, Err(EncryptedMaterialError::InvalidPasswordEncoding)));
        assert!(buf.iter().all(|b| *b == 0));
    }
}
