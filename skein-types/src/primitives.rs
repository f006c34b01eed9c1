use std::fmt;

/// Opaque 32-bit identifier for a database entity (row, table, column, ...).
///
/// Tokens are interned upstream; this crate only compares and hashes them.
pub type Token = u32;

/// Content form of a yarn body (encoding or content-type tag).
///
/// The runtime never interprets the value beyond equality; collaborators
/// agree on meanings such as "plain bytes" or "utf-8 text".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Form(pub u32);

impl Form {
    /// Untyped bytes.
    pub const PLAIN: Form = Form(0);

    /// UTF-8 encoded text (ascii 'utf8').
    pub const UTF8: Form = Form(0x7574_6638);

    pub fn is_plain(&self) -> bool {
        *self == Form::PLAIN
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "form:{:#x}", self.0)
    }
}
