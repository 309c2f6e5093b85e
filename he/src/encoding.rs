use serde::{Deserialize, Serialize};

/// Real vector packed into plaintext slots: coordinate `i` lives in slot `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedPlaintext {
    slots: Vec<f64>,
}

impl PackedPlaintext {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[f64] {
        &self.slots
    }

    pub(crate) fn from_slots(slots: Vec<f64>) -> Self {
        Self { slots }
    }
}

/// Pack a dense vector. Slots past the end of `vector` are zero once encrypted.
pub fn encode(vector: &[f64]) -> PackedPlaintext {
    PackedPlaintext {
        slots: vector.to_vec(),
    }
}

/// Read back the first `keep_slots` slots (fewer if the plaintext is shorter).
pub fn decode(pt: &PackedPlaintext, keep_slots: usize) -> Vec<f64> {
    pt.slots.iter().take(keep_slots).copied().collect()
}
