use super::*;

#[test]
fn accepts_consistent_batch() {
    let vectors = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
    assert_eq!(validate_batch(2, &vectors), Ok(Some(2)));
    assert_eq!(validate_batch(0, &[]), Ok(None));
}

#[test]
fn rejects_wrong_count() {
    let vectors = vec![vec![0.1, 0.2]];
    assert_eq!(
        validate_batch(2, &vectors),
        Err(MalformedOutput::CountMismatch {
            expected: 2,
            found: 1
        })
    );
}

#[test]
fn rejects_empty_and_non_finite_vectors() {
    assert_eq!(
        validate_batch(2, &[vec![1.0], Vec::new()]),
        Err(MalformedOutput::EmptyVector { index: 1 })
    );
    assert_eq!(
        validate_batch(1, &[vec![1.0, f32::NAN]]),
        Err(MalformedOutput::NonFinite { index: 0 })
    );
    assert_eq!(
        validate_batch(1, &[vec![f32::INFINITY]]),
        Err(MalformedOutput::NonFinite { index: 0 })
    );
}

#[test]
fn rejects_ragged_batch() {
    let vectors = vec![vec![0.1, 0.2, 0.3], vec![0.3, 0.4]];
    assert_eq!(
        validate_batch(2, &vectors),
        Err(MalformedOutput::DimensionMismatch {
            index: 1,
            expected: 3,
            found: 2
        })
    );
}
