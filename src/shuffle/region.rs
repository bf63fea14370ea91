/// Rows of the current input batch routed to one partition and not yet
/// written out, plus the bytes already reserved for them in the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRegion {
    row_indexes: Vec<u32>,
    length: u32,
}

impl CacheRegion {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            row_indexes: Vec::with_capacity(rows),
            length: 0,
        }
    }

    /// Records a row whose reservation of `reserved` bytes succeeded.
    #[inline]
    pub fn push(&mut self, row: u32, reserved: u32) {
        self.row_indexes.push(row);
        self.length += reserved;
    }

    pub fn reset(&mut self) {
        self.row_indexes.clear();
        self.length = 0;
    }

    pub fn row_indexes(&self) -> &[u32] {
        &self.row_indexes
    }

    pub fn row_num(&self) -> u32 {
        self.row_indexes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.row_indexes.is_empty()
    }

    /// Total reserved bytes, which is the length of the block these rows
    /// serialize to.
    pub fn length(&self) -> u32 {
        self.length
    }
}

