//! Pool of decoded samples independent of pad assignment.

use std::fmt;
use std::time::SystemTime;

use crate::messages::SampleBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibrarySampleId(pub u64);

impl fmt::Display for LibrarySampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySample {
    pub id: LibrarySampleId,
    pub name: String,
    pub imported_at: SystemTime,
    pub buffer: SampleBuffer,
}

/// Imported samples in import order. Ids are never reused.
#[derive(Debug, Default, Clone)]
pub struct SampleLibrary {
    samples: Vec<LibrarySample>,
    next_id: u64,
}

impl SampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, buffer: SampleBuffer) -> LibrarySampleId {
        let id = LibrarySampleId(self.next_id);
        self.next_id += 1;
        self.samples.push(LibrarySample {
            id,
            name: name.into(),
            imported_at: SystemTime::now(),
            buffer,
        });
        id
    }

    pub fn get(&self, id: LibrarySampleId) -> Option<&LibrarySample> {
        self.samples.iter().find(|sample| sample.id == id)
    }

    pub fn remove(&mut self, id: LibrarySampleId) -> Option<LibrarySample> {
        let index = self.samples.iter().position(|sample| sample.id == id)?;
        Some(self.samples.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibrarySample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
