use std::time::Duration;

/// Creates a timestamp from the message passed to the synchronizer.
pub trait WithTimestamp {
    fn timestamp(&self) -> Duration;
}

/// Capture time and reference frame shared by every input message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Capture timestamp. Zero is treated as "unset".
    pub stamp: Duration,
    /// Name of the frame the payload is expressed in.
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Duration, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// A timestamped set of points.
///
/// Every element carries one value per entry of `fields`, stored
/// row-major in `data`. A record with `height > 1` is organized
/// (image-like); `height == 1` means an unorganized list of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<String>,
    pub data: Vec<f64>,
    /// False when some points may hold non-finite values.
    pub is_dense: bool,
}

impl Record {
    /// Build an unorganized record from row-major `data`.
    pub fn new(header: Header, fields: Vec<String>, data: Vec<f64>) -> Self {
        let width = element_count(data.len(), fields.len());

        Self {
            header,
            height: 1,
            width,
            fields,
            data,
            is_dense: true,
        }
    }

    /// Build an organized record of `height` rows by `width` columns.
    pub fn organized(
        header: Header,
        height: u32,
        width: u32,
        fields: Vec<String>,
        data: Vec<f64>,
    ) -> Self {
        let is_dense = data.iter().all(|v| v.is_finite());
        Self {
            header,
            height,
            width,
            fields,
            data,
            is_dense,
        }
    }

    /// Build an unorganized `x`/`y`/`z` record.
    pub fn from_xyz(header: Header, points: &[[f64; 3]]) -> Self {
        let fields = ["x", "y", "z"].map(String::from).to_vec();
        let data = points.iter().flatten().copied().collect();
        Self::new(header, fields, data)
    }

    pub fn stamp(&self) -> Duration {
        self.header.stamp
    }

    pub fn frame_id(&self) -> &str {
        &self.header.frame_id
    }

    /// Number of elements (`width * height`).
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_organized(&self) -> bool {
        self.height > 1
    }

    /// Position of a named field within each element.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }

    pub fn point(&self, index: usize) -> Option<&[f64]> {
        let step = self.fields.len();
        let start = index.checked_mul(step)?;
        let end = start.checked_add(step)?;
        self.data.get(start..end)
    }

    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero
        self.data.chunks_exact(self.fields.len().max(1))
    }

    /// Checks the layout and header. Returns the reason on failure.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.header.stamp.is_zero() {
            return Err("record has no timestamp");
        }
        if self.header.frame_id.is_empty() {
            return Err("record has an empty frame id");
        }
        if self.len().checked_mul(self.fields.len()) != Some(self.data.len()) {
            return Err("record data size does not match width * height * fields");
        }
        Ok(())
    }
}

/// Number of whole elements in `data_len` values, saturating at
/// `u32::MAX` so that [Record::validate] reports the mismatch.
fn element_count(data_len: usize, num_fields: usize) -> u32 {
    match num_fields {
        0 => 0,
        n => u32::try_from(data_len / n).unwrap_or(u32::MAX),
    }
}

impl WithTimestamp for Record {
    fn timestamp(&self) -> Duration {
        self.header.stamp
    }
}

/// Indices selecting elements of the record captured at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSubset {
    pub header: Header,
    pub indices: Vec<usize>,
}

impl IndexSubset {
    pub fn new(header: Header, indices: Vec<usize>) -> Self {
        Self { header, indices }
    }

    pub fn stamp(&self) -> Duration {
        self.header.stamp
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.header.stamp.is_zero() {
            return Err("indices have no timestamp");
        }
        Ok(())
    }
}

impl WithTimestamp for IndexSubset {
    fn timestamp(&self) -> Duration {
        self.header.stamp
    }
}

/// A record together with the index subset asserted to describe the
/// same instant, if the index stream is in use.
#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizedPair {
    pub record: Record,
    pub indices: Option<IndexSubset>,
}

impl SynchronizedPair {
    pub fn new(record: Record, indices: Option<IndexSubset>) -> Self {
        Self { record, indices }
    }

    pub fn stamp(&self) -> Duration {
        self.record.header.stamp
    }
}
