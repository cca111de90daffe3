use crate::beagle::errors::BeagleError;

/// Number of integers in the flat encoding of one operation.
pub const OPERATION_TUPLE_SIZE: usize = 7;
/// Marker for an absent scale buffer in the flat encoding.
pub const NONE: i32 = -1;

/// One post-order step: combine `child1` and `child2` through their transition matrices
/// into `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub destination: usize,
    pub dest_scale_write: Option<usize>,
    pub dest_scale_read: Option<usize>,
    pub child1: usize,
    pub child1_matrix: usize,
    pub child2: usize,
    pub child2_matrix: usize,
}

impl Operation {
    pub fn new(
        destination: usize,
        child1: usize,
        child1_matrix: usize,
        child2: usize,
        child2_matrix: usize,
    ) -> Self {
        Self {
            destination,
            dest_scale_write: None,
            dest_scale_read: None,
            child1,
            child1_matrix,
            child2,
            child2_matrix,
        }
    }

    pub fn with_scale_write(mut self, scale_index: usize) -> Self {
        self.dest_scale_write = Some(scale_index);
        self
    }

    pub fn with_scale_read(mut self, scale_index: usize) -> Self {
        self.dest_scale_read = Some(scale_index);
        self
    }

    /// Decodes one 7-tuple `{dest, scaleWrite, scaleRead, child1, matrix1, child2, matrix2}`.
    pub fn from_tuple(tuple: &[i32]) -> Result<Self, BeagleError> {
        if tuple.len() != OPERATION_TUPLE_SIZE {
            return Err(BeagleError::LengthMismatch {
                what: "operation tuple",
                expected: OPERATION_TUPLE_SIZE,
                actual: tuple.len(),
            });
        }
        Ok(Self {
            destination: index(tuple, 0)?,
            dest_scale_write: optional_index(tuple, 1)?,
            dest_scale_read: optional_index(tuple, 2)?,
            child1: index(tuple, 3)?,
            child1_matrix: index(tuple, 4)?,
            child2: index(tuple, 5)?,
            child2_matrix: index(tuple, 6)?,
        })
    }

    /// Decodes a flat list of back to back 7-tuples.
    pub fn from_flat(flat: &[i32]) -> Result<Vec<Self>, BeagleError> {
        if flat.len() % OPERATION_TUPLE_SIZE != 0 {
            return Err(BeagleError::LengthMismatch {
                what: "flat operation list",
                expected: (flat.len() / OPERATION_TUPLE_SIZE + 1) * OPERATION_TUPLE_SIZE,
                actual: flat.len(),
            });
        }
        flat.chunks(OPERATION_TUPLE_SIZE)
            .map(Self::from_tuple)
            .collect()
    }

    pub fn to_tuple(&self) -> [i32; OPERATION_TUPLE_SIZE] {
        let encode = |idx: Option<usize>| idx.map_or(NONE, |i| i as i32);
        [
            self.destination as i32,
            encode(self.dest_scale_write),
            encode(self.dest_scale_read),
            self.child1 as i32,
            self.child1_matrix as i32,
            self.child2 as i32,
            self.child2_matrix as i32,
        ]
    }
}

fn index(tuple: &[i32], position: usize) -> Result<usize, BeagleError> {
    let value = tuple[position];
    usize::try_from(value).map_err(|_| BeagleError::InvalidOperationTuple { position, value })
}

fn optional_index(tuple: &[i32], position: usize) -> Result<Option<usize>, BeagleError> {
    match tuple[position] {
        NONE => Ok(None),
        _ => index(tuple, position).map(Some),
    }
}
