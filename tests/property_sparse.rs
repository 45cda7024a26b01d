//! Property-based tests for the sparse weight codec
//!
//! These tests use proptest to verify the codec's structural invariants
//! across randomly shaped, randomly sparse matrices.

use esparso::sparse::{analyze, pad_to_lanes, LANE_WIDTH};
use esparso::{DenseMatrix, SparseWeights};
use proptest::prelude::*;

/// Strategy for matrices with a realistic mix of zero and nonzero entries
fn sparse_matrix_strategy() -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
    (1usize..8, 1usize..24).prop_flat_map(|(rows, cols)| {
        let element = prop_oneof![
            3 => Just(0.0f32),
            2 => (-1.0f32..1.0).prop_filter("nonzero", |v| *v != 0.0),
        ];
        (
            Just(rows),
            Just(cols),
            prop::collection::vec(element, rows * cols),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The per-row counts sum to the source matrix's nonzero count
    #[test]
    fn test_row_counts_sum_to_source_nonzeros(
        (rows, cols, data) in sparse_matrix_strategy()
    ) {
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let sparse = SparseWeights::encode(&matrix, 4).unwrap();
        let total: usize = sparse.row_counts.iter().map(|&c| c as usize).sum();
        prop_assert_eq!(total, matrix.count_nonzeros());
    }

    /// Every row's padded count is a lane multiple, and empty rows get none
    #[test]
    fn test_row_padding_is_lane_aligned(
        (rows, cols, data) in sparse_matrix_strategy()
    ) {
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let sparse = SparseWeights::encode(&matrix, 4).unwrap();
        for (count, padded) in sparse.row_counts.iter().zip(&sparse.row_padded) {
            prop_assert_eq!(*padded as usize, pad_to_lanes(*count as usize));
            prop_assert_eq!(*padded as usize % LANE_WIDTH, 0);
            if *count == 0 {
                prop_assert_eq!(*padded, 0);
            }
        }
        let padded_total: usize = sparse.row_padded.iter().map(|&p| p as usize).sum();
        prop_assert_eq!(padded_total, sparse.padded_len());
    }

    /// The analyzer's totals agree with the encoded buffers
    #[test]
    fn test_budget_matches_encoding(
        (rows, cols, data) in sparse_matrix_strategy()
    ) {
        let budget = analyze(&data, rows, cols).unwrap();
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let sparse = SparseWeights::encode(&matrix, 4).unwrap();
        prop_assert_eq!(budget.nonzeros, matrix.count_nonzeros());
        prop_assert_eq!(budget.padded_len, sparse.padded_len());
        prop_assert_eq!(budget.is_empty(), sparse.is_empty());
    }

    /// Decoding reconstructs the source pattern and values exactly
    #[test]
    fn test_decode_reconstructs_source(
        (rows, cols, data) in sparse_matrix_strategy(),
        im_size in 1usize..16,
    ) {
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let sparse = SparseWeights::encode(&matrix, im_size).unwrap();
        let decoded = sparse.decode(rows, cols, im_size).unwrap();
        prop_assert_eq!(decoded, matrix);
    }

    /// Encoding the same matrix twice produces identical buffers
    #[test]
    fn test_encode_is_deterministic(
        (rows, cols, data) in sparse_matrix_strategy()
    ) {
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let first = SparseWeights::encode(&matrix, 8).unwrap();
        let second = SparseWeights::encode(&matrix, 8).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Padding slots hold zero values and zero (no-op) strides
    #[test]
    fn test_padding_slots_are_noops(
        (rows, cols, data) in sparse_matrix_strategy()
    ) {
        let matrix = DenseMatrix::from_vec(rows, cols, data).unwrap();
        let sparse = SparseWeights::encode(&matrix, 4).unwrap();
        let mut slot = 0usize;
        for (count, padded) in sparse.row_counts.iter().zip(&sparse.row_padded) {
            for j in 0..*padded as usize {
                if j >= *count as usize {
                    prop_assert_eq!(sparse.values[slot + j], 0.0);
                    prop_assert_eq!(sparse.diffs[slot + j], 0);
                }
            }
            slot += *padded as usize;
        }
    }

    /// The shape precondition rejects any mismatched element count
    #[test]
    fn test_analyze_shape_precondition(len in 1usize..64) {
        let data = vec![1.0f32; len];
        // 7 columns: only multiples of 7 are valid heights for this length.
        if len % 7 != 0 {
            let height = len / 7 + 1;
            prop_assert!(analyze(&data, height, 7).is_err());
        }
    }
}
