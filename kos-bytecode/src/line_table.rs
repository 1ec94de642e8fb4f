//! Address-to-line table: maps a bytecode offset within one function back to
//! a source line, for panic backtraces and (eventually) a debugger's
//! breakpoint resolution.

/// One `(offset, line)` entry. Offsets are monotonically non-decreasing
/// across a table; when the emitter would push two entries at the same
/// offset, it keeps the larger line instead of growing the table (see
/// [`LineTable::push`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub offset: u32,
    pub line: u32,
}

/// Per-function address-to-line table, built incrementally as the emitter
/// walks the AST and queried by the interpreter on panic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn new() -> Self {
        LineTable { entries: Vec::new() }
    }

    /// Record that code starting at `offset` belongs to `line`. Offsets must
    /// be pushed in non-decreasing order; repeated offsets compress into a
    /// single entry carrying the largest line seen for it.
    pub fn push(&mut self, offset: u32, line: u32) {
        if let Some(last) = self.entries.last_mut() {
            debug_assert!(offset >= last.offset, "line table offsets must be non-decreasing");
            if last.offset == offset {
                last.line = last.line.max(line);
                return;
            }
        }
        self.entries.push(LineEntry { offset, line });
    }

    /// Look up the source line for a bytecode offset: the largest entry
    /// whose offset is `<= offset`, or `None` for a table with no entry at or before it.
    pub fn lookup(&self, offset: u32) -> Option<u32> {
        match self.entries.binary_search_by(|e| e.offset.cmp(&offset)) {
            Ok(idx) => Some(self.entries[idx].line),
            Err(0) => None,
            Err(idx) => Some(self.entries[idx - 1].line),
        }
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        for e in &self.entries {
            buf.extend_from_slice(&e.offset.to_le_bytes());
            buf.extend_from_slice(&e.line.to_le_bytes());
        }
    }

    pub fn read_from(bytes: &[u8]) -> LineTable {
        let mut entries = Vec::with_capacity(bytes.len() / 8);
        let mut chunks = bytes.chunks_exact(8);
        for c in &mut chunks {
            let offset = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            let line = u32::from_le_bytes([c[4], c[5], c[6], c[7]]);
            entries.push(LineEntry { offset, line });
        }
        LineTable { entries }
    }

    /// Byte size of the encoded form: 8 bytes per entry.
    pub fn encoded_len(&self) -> usize {
        self.entries.len() * 8
    }
}
