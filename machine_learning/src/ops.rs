use ndarray::{ArrayView1, ArrayView2};

/// Returns the index of the largest value in `row`, ties resolve to the lowest index.
///
/// An empty row yields `0`.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;

    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }

    best
}

/// Counts the rows of `scores` whose argmax equals the corresponding label.
pub fn count_correct(scores: ArrayView2<f32>, labels: ArrayView1<usize>) -> usize {
    scores
        .outer_iter()
        .zip(labels)
        .filter(|(row, label)| argmax(row.view()) == **label)
        .count()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn argmax_picks_the_largest() {
        assert_eq!(argmax(array![0.1, 0.7, 0.3].view()), 1);
    }

    #[test]
    fn argmax_ties_go_to_the_lowest_index() {
        assert_eq!(argmax(array![0.5, 0.9, 0.9, 0.1].view()), 1);
    }

    #[test]
    fn count_correct_compares_row_argmax() {
        let scores = array![[1.0, 0.0], [0.0, 1.0], [2.0, 3.0]];
        let labels = array![0, 0, 1];
        assert_eq!(count_correct(scores.view(), labels.view()), 2);
    }
}
