// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Conversion between linear indices and mixed-radix coordinates.
//!
//! Dimension 0 varies fastest.

use crate::Coordinates;

/// Linear index of `coords` within `dims`, or `None` if the arity is wrong or
/// a coordinate is out of range.
#[must_use]
pub fn linearize(coords: &[usize], dims: &[usize]) -> Option<usize> {
    if coords.len() != dims.len() {
        return None;
    }
    let mut index = 0;
    let mut mult = 1;
    for (&coord, &size) in coords.iter().zip(dims) {
        if coord >= size {
            return None;
        }
        index += coord * mult;
        mult *= size;
    }
    Some(index)
}

#[must_use]
pub fn delinearize(index: usize, dims: &[usize]) -> Coordinates {
    let mut div = 1;
    dims.iter()
        .map(|&size| {
            let coord = (index / div) % size;
            div *= size;
            coord
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn round_trip() {
        let dims = [3, 1, 4, 2];
        let all: Vec<_> = dims
            .iter()
            .map(|&size| 0..size)
            .multi_cartesian_product()
            .collect();
        for coords in &all {
            let index = linearize(coords, &dims).unwrap();
            assert_eq!(&delinearize(index, &dims), coords);
        }
        let mut indices: Vec<_> = all.iter().map(|c| linearize(c, &dims).unwrap()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_bad_coords() {
        assert_eq!(linearize(&[0, 4], &[4, 4]), None);
        assert_eq!(linearize(&[0], &[4, 4]), None);
        assert_eq!(linearize(&[1, 2], &[4, 4]), Some(9));
    }
}
