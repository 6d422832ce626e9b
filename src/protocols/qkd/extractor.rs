//! Privacy amplification by inner-product extraction.
//!
//! A raw key `x` of length `m` is split into `k` contiguous chunks of
//! ⌊m/k⌋ bits (the remainder is dropped). Each chunk contributes one output
//! bit: the parity of its bitwise AND with the matching chunk of the public
//! seed. With `k = 1` this is the classic two-universal inner-product
//! extractor over the whole raw key.

use crate::Result;
use crate::core::errors::QkdError;

/// Extracts `k` secret bits from `x` using `seed`.
///
/// # Errors
///
/// - [`QkdError::ExtractionSize`] if `k` is zero or larger than `x`.
/// - [`QkdError::SeedLength`] if `seed` does not cover the `k` chunks.
pub fn extract_key(x: &[u8], seed: &[u8], k: usize) -> Result<Vec<u8>> {
    let available = x.len();
    if k == 0 || k > available {
        return Err(QkdError::ExtractionSize {
            requested: k,
            available,
        });
    }

    let chunk_size = available / k;
    let required = chunk_size * k;
    if seed.len() < required {
        return Err(QkdError::SeedLength {
            required,
            available: seed.len(),
        });
    }

    Ok(x.chunks_exact(chunk_size)
        .zip(seed.chunks_exact(chunk_size))
        .take(k)
        .map(|(xs, ss)| inner_product(xs, ss))
        .collect())
}

/// Parity of the bitwise AND of two equally long bit slices.
fn inner_product(x: &[u8], seed: &[u8]) -> u8 {
    x.iter().zip(seed).fold(0, |acc, (a, s)| acc ^ (a & s & 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bit_is_parity_of_and() {
        assert_eq!(extract_key(&[1, 1, 1], &[1, 1, 0], 1).unwrap(), vec![0]);
        assert_eq!(extract_key(&[1, 1, 1], &[1, 1, 1], 1).unwrap(), vec![1]);
    }

    #[test]
    fn chunks_yield_one_bit_each() {
        let key = extract_key(&[1, 0, 1, 0, 1, 1], &[1, 1, 0, 0, 1, 1], 3).unwrap();
        assert_eq!(key, vec![1, 0, 0]);
    }

    #[test]
    fn uneven_tail_is_dropped() {
        // chunks of 2: (1,1)(0,1)(1,0) + tail (1)
        let key = extract_key(&[1, 1, 0, 1, 1, 0, 1], &[1, 1, 1, 1, 1, 1, 1], 3).unwrap();
        assert_eq!(key, vec![0, 1, 1]);
    }

    #[test]
    fn too_many_output_bits_is_an_error() {
        let err = extract_key(&[1, 0, 1], &[1, 1, 1], 4).unwrap_err();
        assert!(matches!(
            err,
            QkdError::ExtractionSize {
                requested: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn empty_raw_key_cannot_be_extracted() {
        assert!(matches!(
            extract_key(&[], &[], 1),
            Err(QkdError::ExtractionSize { .. })
        ));
    }

    #[test]
    fn short_seed_is_an_error() {
        let err = extract_key(&[1, 0, 1, 1], &[1, 0], 2).unwrap_err();
        assert!(matches!(
            err,
            QkdError::SeedLength {
                required: 4,
                available: 2
            }
        ));
    }
}
