use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x53494C54; // "SILT"

const MAGIC_OFFSET: usize = 0;
const RECORD_COUNT_OFFSET: usize = 4;
const RECORDS_OFFSET: usize = 8;

/// Null-padded fixed-width index name
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn pad_name(name: &str) -> [u8; NAME_SIZE] {
    let mut padded = [0u8; NAME_SIZE];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_SIZE);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

/// The catalog page at page id 0: a flat table of
/// (index name, root page id) records.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.data[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        self.set_record_count(0);
    }

    pub fn is_valid(&self) -> bool {
        read_u32(self.data, MAGIC_OFFSET) == MAGIC_NUMBER
    }

    pub fn record_count(&self) -> u32 {
        read_u32(self.data, RECORD_COUNT_OFFSET)
    }

    fn set_record_count(&mut self, count: u32) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&count.to_le_bytes());
    }

    /// Adds a record for `name`. Returns false when the name is
    /// already present; errors when the catalog is full.
    pub fn insert_record(&mut self, name: &str, root_id: PageId) -> Result<bool> {
        if find_record(self.data, name).is_some() {
            return Ok(false);
        }
        let count = self.record_count() as usize;
        if count >= MAX_RECORDS {
            return Err(SiltError::HeaderPageFull);
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].copy_from_slice(&pad_name(name));
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_id.as_u32().to_le_bytes());
        self.set_record_count(count as u32 + 1);
        Ok(true)
    }

    /// Rewrites the root page id of an existing record. Returns false
    /// when the name is absent.
    pub fn update_record(&mut self, name: &str, root_id: PageId) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        self.data[offset..offset + 4].copy_from_slice(&root_id.as_u32().to_le_bytes());
        true
    }

    /// Removes a record, compacting the tail over it. Returns false
    /// when the name is absent.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let count = self.record_count() as usize;
        let start = RECORDS_OFFSET + index * RECORD_SIZE;
        let end = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data.copy_within(start + RECORD_SIZE..end, start);
        self.set_record_count(count as u32 - 1);
        true
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = find_record(self.data, name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        Some(PageId::new(read_u32(self.data, offset)))
    }
}

/// Read-only view of the catalog page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn is_valid(&self) -> bool {
        read_u32(self.data, MAGIC_OFFSET) == MAGIC_NUMBER
    }

    pub fn record_count(&self) -> u32 {
        read_u32(self.data, RECORD_COUNT_OFFSET)
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = find_record(self.data, name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        Some(PageId::new(read_u32(self.data, offset)))
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    let count = read_u32(data, RECORD_COUNT_OFFSET) as usize;
    let padded = pad_name(name);
    (0..count).find(|&i| {
        let offset = RECORDS_OFFSET + i * RECORD_SIZE;
        data[offset..offset + NAME_SIZE] == padded
    })
}
