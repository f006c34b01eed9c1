use skein_types::primitives::Token;

/// Result of one cursor step over a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<V> {
    /// The cursor rests on a live entry.
    Here { key: Token, val: V },
    /// The entry under the cursor was just removed.
    Cut { key: Token, val: V },
    /// No entry: the map is exhausted or the cursor is not positioned.
    End,
}

impl<V> Change<V> {
    pub fn is_end(&self) -> bool {
        matches!(self, Change::End)
    }

    pub fn is_cut(&self) -> bool {
        matches!(self, Change::Cut { .. })
    }

    pub fn key(&self) -> Option<Token> {
        match self {
            Change::Here { key, .. } | Change::Cut { key, .. } => Some(*key),
            Change::End => None,
        }
    }

    /// The live entry under the cursor, if any.
    pub fn entry(&self) -> Option<(Token, &V)> {
        match self {
            Change::Here { key, val } => Some((*key, val)),
            _ => None,
        }
    }
}
