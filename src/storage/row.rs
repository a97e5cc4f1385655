//! Fixed-width row codec.
//!
//! A row is stored byte-for-byte in a leaf cell: the primary id in
//! little-endian at offset 0, followed by the raw username and email
//! arrays. Text fields are null-padded; there is no length prefix.
use std::fmt;

pub const ID_SIZE: usize = std::mem::size_of::<u32>();
pub const USERNAME_SIZE: usize = 32;
pub const EMAIL_SIZE: usize = 256;

pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Total size of a serialized row in bytes.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single table row: `id INT PRIMARY KEY, username VARCHAR(32),
/// email VARCHAR(256)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: [u8; USERNAME_SIZE],
    pub email: [u8; EMAIL_SIZE],
}

/// Copies text into a zero-initialized field of width `N`, truncating
/// anything past the field width. The zero fill doubles as the null
/// padding of short values.
fn pad_field<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [0u8; N];
    for (dst, src) in field.iter_mut().zip(text.bytes()) {
        *dst = src;
    }
    field
}

/// Decodes a null-padded field up to its first NUL byte.
fn field_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Row {
    /// Builds a row from text fields.
    ///
    /// Over-long fields are truncated at the column width; the statement
    /// parser rejects them before this point.
    pub fn new(id: u32, username: &str, email: &str) -> Self {
        Row {
            id,
            username: pad_field(username),
            email: pad_field(email),
        }
    }

    /// Writes the row into `dst[0..ROW_SIZE]`.
    ///
    /// # Arguments
    /// - `dst`: Destination buffer, at least [`ROW_SIZE`] bytes long.
    ///
    /// # Returns
    /// The number of bytes written, always [`ROW_SIZE`].
    ///
    /// # Panics
    /// A destination shorter than [`ROW_SIZE`] is a programming error.
    pub fn serialize(&self, dst: &mut [u8]) -> usize {
        dst[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        dst[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE].copy_from_slice(&self.username);
        dst[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE].copy_from_slice(&self.email);
        ROW_SIZE
    }

    /// Reads a row back from `src[0..ROW_SIZE]`.
    ///
    /// # Arguments
    /// - `src`: Source buffer, at least [`ROW_SIZE`] bytes long.
    ///
    /// # Panics
    /// A source shorter than [`ROW_SIZE`] is a programming error.
    pub fn deserialize(src: &[u8]) -> Self {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&src[ID_OFFSET..ID_OFFSET + ID_SIZE]);

        let mut username = [0u8; USERNAME_SIZE];
        username.copy_from_slice(&src[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);

        let mut email = [0u8; EMAIL_SIZE];
        email.copy_from_slice(&src[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);

        Row {
            id: u32::from_le_bytes(id_bytes),
            username,
            email,
        }
    }

    /// The username as text, with the null padding stripped.
    pub fn username(&self) -> String {
        field_text(&self.username)
    }

    /// The email as text, with the null padding stripped.
    pub fn email(&self) -> String {
        field_text(&self.email)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username(), self.email())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_size() {
        assert_eq!(ROW_SIZE, 292);
        assert_eq!(USERNAME_OFFSET, 4);
        assert_eq!(EMAIL_OFFSET, 36);
    }

    #[test]
    fn test_round_trip() {
        let row = Row::new(12, "chen", "we@qq.com");
        let mut buf = [0u8; ROW_SIZE];
        assert_eq!(row.serialize(&mut buf), ROW_SIZE);

        let decoded = Row::deserialize(&buf);
        assert_eq!(decoded, row);
        assert_eq!(decoded.id, 12);
        assert_eq!(decoded.username(), "chen");
        assert_eq!(decoded.email(), "we@qq.com");
    }

    #[test]
    fn test_display_strips_padding() {
        let row = Row::new(7, "guest", "guest@example.com");
        assert_eq!(format!("{}", row), "(7, guest, guest@example.com)");
    }

    #[test]
    fn test_full_width_field() {
        let name = "a".repeat(USERNAME_SIZE);
        let row = Row::new(1, &name, "a@b.c");
        assert_eq!(row.username(), name);
    }
}
