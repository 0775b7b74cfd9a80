/// Largest batch the portal's query form accepts reliably.
pub const DEFAULT_BATCH_SIZE: usize = 29;

/// Splits `records` into contiguous, order-preserving batches of at most
/// `batch_size` items. A zero size is treated as one.
pub fn plan_batches<T>(records: &[T], batch_size: usize) -> Vec<&[T]> {
    records.chunks(batch_size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_five_records_make_two_batches() {
        let records: Vec<u32> = (0..35).collect();
        let batches = plan_batches(&records, DEFAULT_BATCH_SIZE);

        let sizes: Vec<usize> = batches.iter().map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![29, 6]);
    }

    #[test]
    fn batches_reconstruct_input_in_order() {
        for total in [0_usize, 1, 28, 29, 30, 58, 59, 100] {
            let records: Vec<usize> = (0..total).collect();
            let batches = plan_batches(&records, DEFAULT_BATCH_SIZE);

            assert_eq!(batches.len(), total.div_ceil(DEFAULT_BATCH_SIZE));
            assert!(batches.iter().all(|batch| batch.len() <= DEFAULT_BATCH_SIZE));
            assert_eq!(batches.concat(), records, "total={total}");
        }
    }

    #[test]
    fn zero_batch_size_falls_back_to_single_rows() {
        let records = ["a", "b"];
        assert_eq!(plan_batches(&records, 0).len(), 2);
    }
}
