use serde::{Deserialize, Serialize};

/// Represents a raw chunk from splitting (before embedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Name of the originating document.
    pub source: String,
}

/// Represents one row persisted in the vector table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Row identity, assigned at write time.
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
}

/// A row returned by a similarity search. Smaller distance means closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub source: String,
    pub distance: f32,
}

impl Chunk {
    /// Convert to a table row with its embedding.
    pub fn into_stored(self, id: u64, vector: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id,
            vector,
            text: self.text,
            source: self.source,
        }
    }
}
